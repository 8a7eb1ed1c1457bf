use std::fmt::Arguments;

use log::error;

/// Abort the process after logging `fmt`, without unwinding.
///
/// Used when an invariant the runtime depends on for memory safety (not
/// just correctness) has been violated — for example a double-suspend of
/// the same fiber, or a corrupted intrusive list. Unwinding across such a
/// violation could run destructors over dangling stack memory, so we abort
/// instead of panicking normally.
pub fn panic_nounwind(fmt: Arguments<'_>) -> ! {
	error!("fatal: {fmt}");
	std::process::abort();
}
