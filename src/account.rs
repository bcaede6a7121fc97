//! uid/gid resolution for declared user and group names.
//!
//! Thin wrappers over the reentrant libc lookups. Resources resolve names
//! once during `parse` and carry numeric ids into `process`, so a rename on
//! the host between stages cannot split a single run across two accounts.

use std::ffi::CString;
use std::mem::MaybeUninit;

/// Buffer size for the reentrant passwd/group lookups. glibc's sysconf hint
/// is 1k on most systems; 16k covers pathological NSS backends.
const LOOKUP_BUF_LEN: usize = 16 * 1024;

/// Resolve a user name to its uid. Returns `None` for unknown accounts.
#[cfg(unix)]
pub fn user_id(name: &str) -> Option<u32> {
    let c_name = CString::new(name).ok()?;
    let mut buf = vec![0_u8; LOOKUP_BUF_LEN];
    let mut pwd: MaybeUninit<libc::passwd> = MaybeUninit::uninit();
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    unsafe {
        let rc = libc::getpwnam_r(
            c_name.as_ptr(),
            pwd.as_mut_ptr(),
            buf.as_mut_ptr().cast::<libc::c_char>(),
            buf.len(),
            &mut result,
        );
        if rc != 0 || result.is_null() {
            return None;
        }
        Some(pwd.assume_init().pw_uid)
    }
}

/// Resolve a group name to its gid. Returns `None` for unknown groups.
#[cfg(unix)]
pub fn group_id(name: &str) -> Option<u32> {
    let c_name = CString::new(name).ok()?;
    let mut buf = vec![0_u8; LOOKUP_BUF_LEN];
    let mut grp: MaybeUninit<libc::group> = MaybeUninit::uninit();
    let mut result: *mut libc::group = std::ptr::null_mut();

    unsafe {
        let rc = libc::getgrnam_r(
            c_name.as_ptr(),
            grp.as_mut_ptr(),
            buf.as_mut_ptr().cast::<libc::c_char>(),
            buf.len(),
            &mut result,
        );
        if rc != 0 || result.is_null() {
            return None;
        }
        Some(grp.assume_init().gr_gid)
    }
}

/// Effective uid of the running agent process.
#[cfg(unix)]
pub fn effective_uid() -> u32 {
    unsafe { libc::geteuid() }
}

/// Account name of the effective user, when the account database knows it.
#[cfg(unix)]
pub fn effective_user_name() -> Option<String> {
    let mut buf = vec![0_u8; LOOKUP_BUF_LEN];
    let mut pwd: MaybeUninit<libc::passwd> = MaybeUninit::uninit();
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    unsafe {
        let rc = libc::getpwuid_r(
            effective_uid(),
            pwd.as_mut_ptr(),
            buf.as_mut_ptr().cast::<libc::c_char>(),
            buf.len(),
            &mut result,
        );
        if rc != 0 || result.is_null() {
            return None;
        }
        let name = std::ffi::CStr::from_ptr(pwd.assume_init().pw_name);
        Some(name.to_string_lossy().into_owned())
    }
}
