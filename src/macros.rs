//! Small declarative helper macros shared across the crate.
//!
//! These mirror the style of the teacher crate's own `macros` module: thin,
//! zero-cost wrappers around raw pointer plumbing and debug-only precondition
//! checks, rather than a heavyweight proc-macro layer.

/// Dereference-and-project through a [`crate::pointer::Ptr`] / [`crate::pointer::MutPtr`]
/// without going through a `&`/`&mut` reference first.
///
/// ```ignore
/// ptr!(&value)            // take the address of `value` as a Ptr
/// ptr!(ptr=>field)         // project into `field` through a raw pointer
/// ptr!(ptr=>method())      // call a method through a raw pointer
/// ```
#[macro_export]
macro_rules! ptr {
	(&$value:expr) => {
		$crate::pointer::Ptr::from(::std::ptr::addr_of!($value))
	};

	(&mut $value:expr) => {
		$crate::pointer::MutPtr::from(::std::ptr::addr_of_mut!($value))
	};

	($ptr:expr=>$($rest:tt)*) => {
		(*$crate::pointer::AsRaw::as_raw(&$ptr)).$($rest)*
	};
}

pub use ptr;

/// Compute the address of the struct containing `$field` given a pointer to
/// the field itself.
#[macro_export]
macro_rules! container_of {
	($ptr:expr, $type:ty=>$field:ident) => {
		$crate::pointer::MutPtr::<$type>::from(
			$crate::pointer::AsRaw::as_raw(&$ptr)
				.cast::<u8>()
				.sub(::std::mem::offset_of!($type, $field))
				.cast::<$type>()
		)
	};
}

pub use container_of;

/// Panic without unwinding through the stack that's about to be torn down.
///
/// Used at points where unwinding would cross a fiber-stack boundary that
/// has no handler installed (e.g. inside the context-switch trampoline).
#[macro_export]
macro_rules! panic_nounwind {
	($($arg:tt)*) => {{
		$crate::runtime::panic_nounwind(::std::format_args!($($arg)*))
	}};
}

pub use panic_nounwind;

/// Debug-only assertion for `unsafe fn` preconditions. Compiles to
/// [`std::hint::assert_unchecked`] in release builds.
#[macro_export]
macro_rules! assert_unsafe_precondition {
	($condition:expr) => {
		$crate::assert_unsafe_precondition!($condition, ::std::stringify!($condition))
	};

	($condition:expr, $($arg:tt)*) => {{
		#[cfg(debug_assertions)]
		if !$condition {
			$crate::panic_nounwind!(
				"Unsafe precondition(s) violated: {}",
				::std::format_args!($($arg)*)
			);
		}

		#[cfg(not(debug_assertions))]
		unsafe {
			::std::hint::assert_unchecked($condition);
		}
	}};
}

pub use assert_unsafe_precondition;

/// Import the architecture-specific context-switch backend as `platform`.
#[macro_export]
macro_rules! import_sysdeps {
	() => {
		#[cfg(target_arch = "x86_64")]
		mod x64;
		#[cfg(target_arch = "aarch64")]
		mod arm64;

		mod platform {
			#[cfg(target_arch = "x86_64")]
			#[allow(unused_imports)]
			pub use super::x64::*;
			#[cfg(target_arch = "aarch64")]
			#[allow(unused_imports)]
			pub use super::arm64::*;
		}

		#[allow(unused_imports)]
		use platform::*;
	};
}

pub use import_sysdeps;
