//! Win32 security API implementation
//!
//! This module contains all unsafe Windows API code for logon, tokens,
//! privileges and impersonation. Nothing here interprets results beyond
//! turning failures into [`PlatformError`]; the core owns every policy.

use crate::constants::{ERROR_INSUFFICIENT_BUFFER, ERROR_NOT_ALL_ASSIGNED, ERROR_NO_TOKEN};
use crate::core::platform::{ImpersonationLevel, Luid, PrivilegeAction, RawToken, SecurityPlatform};
use crate::core::token_privileges::{encode, PrivilegeAttributes, PrivilegeRecord};
use crate::models::LogonKind;
use crate::utils::PlatformError;
use std::ffi::{c_void, OsStr};
use std::iter;
use std::os::windows::ffi::OsStrExt;
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{CloseHandle, GetLastError, BOOL, HANDLE, LUID};
use windows::Win32::Security::{
    AdjustTokenPrivileges, DuplicateTokenEx, GetTokenInformation, ImpersonateLoggedOnUser,
    LogonUserW, LookupPrivilegeDisplayNameW, LookupPrivilegeNameW, LookupPrivilegeValueW,
    RevertToSelf, SecurityDelegation, SecurityIdentification, SecurityImpersonation,
    TokenImpersonation, TokenPrivileges, LOGON32_LOGON_TYPE, LOGON32_PROVIDER_DEFAULT,
    SECURITY_IMPERSONATION_LEVEL, TOKEN_ACCESS_MASK, TOKEN_ADJUST_PRIVILEGES, TOKEN_DUPLICATE,
    TOKEN_IMPERSONATE, TOKEN_PRIVILEGES, TOKEN_QUERY,
};
use windows::Win32::System::Threading::{
    GetCurrentProcess, GetCurrentThread, OpenProcessToken, OpenThreadToken, SetThreadToken,
};

/// Access requested on every token this module opens or duplicates
const TOKEN_ACCESS: TOKEN_ACCESS_MASK = TOKEN_ACCESS_MASK(
    TOKEN_QUERY.0 | TOKEN_DUPLICATE.0 | TOKEN_IMPERSONATE.0 | TOKEN_ADJUST_PRIVILEGES.0,
);

/// Initial buffer for privilege names, in UTF-16 units
const NAME_CAPACITY: usize = 64;

/// [`SecurityPlatform`] over advapi32/kernel32
pub struct Win32Platform;

impl Win32Platform {
    pub fn new() -> Self {
        Win32Platform
    }
}

impl Default for Win32Platform {
    fn default() -> Self {
        Self::new()
    }
}

fn to_wide(input: &str) -> Vec<u16> {
    OsStr::new(input)
        .encode_wide()
        .chain(iter::once(0))
        .collect()
}

fn handle(token: RawToken) -> HANDLE {
    HANDLE(token.0 as *mut c_void)
}

fn raw(handle: HANDLE) -> RawToken {
    RawToken(handle.0 as isize)
}

/// Recover the Win32 code from an HRESULT_FROM_WIN32 value
fn win32_code(hresult: i32) -> u32 {
    let value = hresult as u32;
    if value & 0xFFFF_0000 == 0x8007_0000 {
        value & 0xFFFF
    } else {
        value
    }
}

fn platform_error(e: windows::core::Error) -> PlatformError {
    PlatformError::new(win32_code(e.code().0), e.message().to_string())
}

fn impersonation_level(level: ImpersonationLevel) -> SECURITY_IMPERSONATION_LEVEL {
    match level {
        ImpersonationLevel::Identification => SecurityIdentification,
        ImpersonationLevel::Impersonation => SecurityImpersonation,
        ImpersonationLevel::Delegation => SecurityDelegation,
    }
}

/// Copy `bytes` into a u32-aligned buffer as the Win32 structs require
fn aligned(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_ne_bytes(word)
        })
        .collect()
}

fn adjust(
    token: HANDLE,
    disable_all: bool,
    new_state: Option<*const TOKEN_PRIVILEGES>,
    length: u32,
) -> Result<(), PlatformError> {
    unsafe {
        AdjustTokenPrivileges(token, BOOL::from(disable_all), new_state, length, None, None)
            .map_err(platform_error)?;

        // Success with ERROR_NOT_ALL_ASSIGNED means some LUIDs were skipped
        if GetLastError().0 == ERROR_NOT_ALL_ASSIGNED {
            return Err(PlatformError::new(
                ERROR_NOT_ALL_ASSIGNED,
                "Not all privileges or groups referenced are assigned to the caller.",
            ));
        }
    }
    Ok(())
}

/// Call a `(PWSTR, *mut u32)` style API, growing the buffer until it fits
fn read_wide_string(
    mut call: impl FnMut(PWSTR, &mut u32) -> windows::core::Result<()>,
) -> Result<String, PlatformError> {
    let mut capacity = NAME_CAPACITY;
    loop {
        let mut buffer = vec![0u16; capacity];
        let mut len = capacity as u32;
        match call(PWSTR(buffer.as_mut_ptr()), &mut len) {
            Ok(()) => {
                let end = (len as usize).min(buffer.len());
                return Ok(String::from_utf16_lossy(&buffer[..end]));
            }
            Err(e) => {
                let err = platform_error(e);
                if err.code != ERROR_INSUFFICIENT_BUFFER || len as usize <= capacity {
                    return Err(err);
                }
                capacity = len as usize;
            }
        }
    }
}

impl SecurityPlatform for Win32Platform {
    fn logon_user(
        &self,
        user: &str,
        domain: Option<&str>,
        secret: &[u16],
        kind: LogonKind,
    ) -> Result<RawToken, PlatformError> {
        debug_assert_eq!(secret.last(), Some(&0));
        let user_w = to_wide(user);
        let domain_w = domain.map(to_wide);
        let domain_ptr = domain_w
            .as_ref()
            .map_or(PCWSTR::null(), |d| PCWSTR(d.as_ptr()));

        let mut token = HANDLE::default();
        // SAFETY: every string is nul-terminated and outlives the call
        unsafe {
            LogonUserW(
                PCWSTR(user_w.as_ptr()),
                domain_ptr,
                PCWSTR(secret.as_ptr()),
                LOGON32_LOGON_TYPE(kind.as_raw()),
                LOGON32_PROVIDER_DEFAULT,
                &mut token,
            )
            .map_err(platform_error)?;
        }
        Ok(raw(token))
    }

    fn duplicate_token(
        &self,
        token: RawToken,
        level: ImpersonationLevel,
    ) -> Result<RawToken, PlatformError> {
        let mut copy = HANDLE::default();
        unsafe {
            DuplicateTokenEx(
                handle(token),
                TOKEN_ACCESS,
                None,
                impersonation_level(level),
                TokenImpersonation,
                &mut copy,
            )
            .map_err(platform_error)?;
        }
        Ok(raw(copy))
    }

    fn open_process_token(&self) -> Result<RawToken, PlatformError> {
        let mut token = HANDLE::default();
        // SAFETY: the pseudo handle from GetCurrentProcess needs no closing
        unsafe {
            OpenProcessToken(GetCurrentProcess(), TOKEN_ACCESS, &mut token)
                .map_err(platform_error)?;
        }
        Ok(raw(token))
    }

    fn close_handle(&self, token: RawToken) -> Result<(), PlatformError> {
        unsafe { CloseHandle(handle(token)).map_err(platform_error) }
    }

    fn token_privileges(
        &self,
        token: RawToken,
        buffer: &mut [u8],
        return_length: &mut u32,
    ) -> Result<(), PlatformError> {
        // Fetch into an aligned scratch buffer, then hand back plain bytes
        let mut scratch = vec![0u32; buffer.len().div_ceil(4)];
        let info = if buffer.is_empty() {
            None
        } else {
            Some(scratch.as_mut_ptr() as *mut c_void)
        };

        unsafe {
            GetTokenInformation(
                handle(token),
                TokenPrivileges,
                info,
                buffer.len() as u32,
                return_length,
            )
            .map_err(platform_error)?;
        }

        let written = (*return_length as usize).min(buffer.len());
        for (i, byte) in scratch
            .iter()
            .flat_map(|w| w.to_ne_bytes())
            .take(written)
            .enumerate()
        {
            buffer[i] = byte;
        }
        Ok(())
    }

    fn adjust_token_privileges(
        &self,
        token: RawToken,
        disable_all: bool,
        actions: &[PrivilegeAction],
    ) -> Result<(), PlatformError> {
        let records: Vec<PrivilegeRecord> = actions
            .iter()
            .map(|a| PrivilegeRecord {
                luid: a.luid,
                attributes: PrivilegeAttributes::from_bits_retain(a.state.attributes()),
            })
            .collect();
        let bytes = encode(&records);
        let state = aligned(&bytes);

        // DisableAllPrivileges ignores NewState, so the batch needs its own call
        if disable_all {
            adjust(handle(token), true, None, 0)?;
        }
        if !actions.is_empty() {
            adjust(
                handle(token),
                false,
                Some(state.as_ptr() as *const TOKEN_PRIVILEGES),
                bytes.len() as u32,
            )?;
        }
        Ok(())
    }

    fn lookup_privilege_name(&self, luid: Luid) -> Result<String, PlatformError> {
        let value = LUID {
            LowPart: luid.low,
            HighPart: luid.high,
        };
        read_wide_string(|name, len| unsafe {
            LookupPrivilegeNameW(PCWSTR::null(), &value, name, len)
        })
    }

    fn lookup_privilege_value(&self, name: &str) -> Result<Luid, PlatformError> {
        let name_w = to_wide(name);
        let mut value = LUID::default();
        unsafe {
            LookupPrivilegeValueW(PCWSTR::null(), PCWSTR(name_w.as_ptr()), &mut value)
                .map_err(platform_error)?;
        }
        Ok(Luid::new(value.LowPart, value.HighPart))
    }

    fn lookup_privilege_display_name(&self, name: &str) -> Result<String, PlatformError> {
        let name_w = to_wide(name);
        let mut language = 0u32;
        read_wide_string(|display, len| unsafe {
            LookupPrivilegeDisplayNameW(
                PCWSTR::null(),
                PCWSTR(name_w.as_ptr()),
                display,
                len,
                &mut language,
            )
        })
    }

    fn impersonate(&self, token: RawToken) -> Result<(), PlatformError> {
        unsafe { ImpersonateLoggedOnUser(handle(token)).map_err(platform_error) }
    }

    fn revert_to_self(&self) -> Result<(), PlatformError> {
        unsafe { RevertToSelf().map_err(platform_error) }
    }

    fn current_thread_token(&self) -> Result<Option<RawToken>, PlatformError> {
        let mut token = HANDLE::default();
        // SAFETY: GetCurrentThread is a pseudo handle; the access check runs
        // against the process so an identification-level token still opens
        let opened = unsafe {
            OpenThreadToken(GetCurrentThread(), TOKEN_ACCESS, BOOL::from(true), &mut token)
        };
        match opened.map_err(platform_error) {
            Ok(()) => Ok(Some(raw(token))),
            Err(e) if e.code == ERROR_NO_TOKEN => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set_thread_token(&self, token: Option<RawToken>) -> Result<(), PlatformError> {
        let token = token.map(handle).unwrap_or_default();
        // SAFETY: a null thread pointer targets the calling thread
        unsafe { SetThreadToken(None, token).map_err(platform_error) }
    }
}
