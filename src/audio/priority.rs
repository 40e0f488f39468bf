//! Scheduling priority for engine threads

/// Elevated priorities used by the audio threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadPriority {
    /// Playback
    High,
    /// Capture, the most latency sensitive path
    Highest,
}

impl ThreadPriority {
    /// Raise the calling thread's priority. Must be called from the engine
    /// thread itself. Failure only costs latency, so it is logged and ignored.
    pub fn apply_to_current_thread(self) {
        #[cfg(windows)]
        {
            use windows::Win32::System::Threading::{
                GetCurrentThread, SetThreadPriority, THREAD_PRIORITY_ABOVE_NORMAL,
                THREAD_PRIORITY_HIGHEST,
            };

            let level = match self {
                ThreadPriority::High => THREAD_PRIORITY_ABOVE_NORMAL,
                ThreadPriority::Highest => THREAD_PRIORITY_HIGHEST,
            };
            // SAFETY: GetCurrentThread returns a pseudo handle valid for the
            // calling thread; no memory is shared with the call.
            let _ = unsafe { SetThreadPriority(GetCurrentThread(), level) };
            tracing::debug!(priority = ?self, "Thread priority raised");
        }

        #[cfg(not(windows))]
        {
            tracing::trace!(priority = ?self, "Thread priority left to the OS scheduler");
        }
    }
}
