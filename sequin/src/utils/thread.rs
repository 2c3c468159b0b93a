#![allow(unused)]

use std::ffi::CStr;

const MAX_PTHREAD_NAME_LEN: usize = 16;

// Linux uses pthread_setname_np(pthread_t, *const c_char).
// Names are limited to 16 bytes, including the null terminator.
#[cfg(target_os = "linux")]
pub(crate) fn set_current_thread_name(name: &str) {
    let bytes = name.as_bytes();
    let len_to_copy = std::cmp::min(bytes.len(), MAX_PTHREAD_NAME_LEN - 1);

    // The buffer is zero-initialized and we write at most
    // MAX_PTHREAD_NAME_LEN - 1 bytes, so it stays null-terminated.
    let mut c_name_buf: [libc::c_char; MAX_PTHREAD_NAME_LEN] = [0; MAX_PTHREAD_NAME_LEN];
    for i in 0..len_to_copy {
        c_name_buf[i] = bytes[i] as libc::c_char;
    }

    unsafe {
        let thread = libc::pthread_self();
        libc::pthread_setname_np(thread, c_name_buf.as_ptr());
    }
}

/// Gets the name of the current thread via `pthread_getname_np`, the
/// counterpart to `pthread_setname_np`.
#[cfg(target_os = "linux")]
pub(crate) fn get_current_thread_name() -> Option<String> {
    let mut c_name_buf: [libc::c_char; MAX_PTHREAD_NAME_LEN] = [0; MAX_PTHREAD_NAME_LEN];

    let ret = unsafe {
        let thread = libc::pthread_self();
        libc::pthread_getname_np(thread, c_name_buf.as_mut_ptr(), MAX_PTHREAD_NAME_LEN)
    };

    if ret != 0 {
        return None;
    }

    let c_str = unsafe { CStr::from_ptr(c_name_buf.as_ptr()) };
    c_str.to_str().ok().map(|s| s.to_string())
}

/// Applies a niceness hint to the calling thread. Lowering niceness below
/// zero usually requires privileges; failure is deliberately ignored, the
/// hint is best-effort.
#[cfg(target_os = "linux")]
pub(crate) fn set_current_thread_niceness(niceness: i32) {
    unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
        libc::setpriority(libc::PRIO_PROCESS, tid, niceness);
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn set_current_thread_name(_name: &str) {}

#[cfg(not(target_os = "linux"))]
pub(crate) fn get_current_thread_name() -> Option<String> {
    None
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn set_current_thread_niceness(_niceness: i32) {}
