//! Fiber stack allocation.
//!
//! The default allocator maps anonymous, guarded memory directly via
//! `libc::mmap`, the same low-level approach the teacher crate's `os::mman`
//! layer takes for worker stacks, narrowed to the one flag combination a
//! fiber stack needs: readable and writable, never executable, with a
//! leading guard page so a stack overflow segfaults instead of silently
//! corrupting the next stack in memory.

use std::io;
use std::ptr;

use crate::pointer::Ptr;

/// Default fiber stack size when [`Attributes`](crate::spawn::Attributes)
/// doesn't specify one.
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

/// A mapped fiber stack.
pub struct Stack {
	base: *mut libc::c_void,
	mapped_len: usize,
	usable_len: usize
}

impl Stack {
	/// Map a new stack of at least `size` bytes, rounded up to a whole
	/// number of pages, with one guard page prepended.
	pub fn new(size: usize) -> io::Result<Self> {
		let page_size = page_size();
		let usable_len = round_up(size.max(page_size), page_size);
		let mapped_len = usable_len + page_size;

		/* Safety: a fresh anonymous mapping, no aliasing possible */
		let base = unsafe {
			libc::mmap(
				ptr::null_mut(),
				mapped_len,
				libc::PROT_NONE,
				libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
				-1,
				0
			)
		};

		if base == libc::MAP_FAILED {
			return Err(io::Error::last_os_error());
		}

		/* Safety: `page_size` bytes into a `mapped_len`-byte mapping we just
		 * created, well within bounds */
		let usable = unsafe { base.cast::<u8>().add(page_size) };

		/* Safety: `usable`/`usable_len` describe the portion of the mapping
		 * past the guard page */
		let result =
			unsafe { libc::mprotect(usable.cast(), usable_len, libc::PROT_READ | libc::PROT_WRITE) };

		if result != 0 {
			let err = io::Error::last_os_error();

			/* Safety: undo the mapping we just made */
			unsafe { libc::munmap(base, mapped_len) };

			return Err(err);
		}

		Ok(Self { base, mapped_len, usable_len })
	}

	/// The address one past the top of the usable region. Stacks grow down,
	/// so this is where the initial stack pointer is set.
	#[must_use]
	pub fn top(&self) -> Ptr<()> {
		/* Safety: `base + mapped_len` is one past the end of our own
		 * mapping, a valid (if unreadable) address to compute */
		let top = unsafe { self.base.cast::<u8>().add(self.mapped_len) };

		Ptr::from(top.cast_const().cast::<()>())
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.usable_len
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		false
	}

	/// Tell the kernel the stack's physical pages can be dropped without
	/// unmapping the reservation, freeing memory while a stack sits idle in
	/// the fiber pool.
	pub fn discard(&mut self) {
		/* Safety: advisory only; a failure here just costs us physical
		 * memory a little longer, nothing unsound */
		let _ = unsafe {
			libc::madvise(
				self.base.cast::<u8>().add(self.mapped_len - self.usable_len).cast(),
				self.usable_len,
				libc::MADV_DONTNEED
			)
		};
	}
}

impl Drop for Stack {
	fn drop(&mut self) {
		/* Safety: `base`/`mapped_len` describe exactly the mapping `new`
		 * created, and nothing else holds a reference into it */
		unsafe {
			libc::munmap(self.base, self.mapped_len);
		}
	}
}

/* Safety: the mapping is exclusively owned by this `Stack` */
unsafe impl Send for Stack {}

fn page_size() -> usize {
	/* Safety: pure syscall wrapper, always safe to call */
	let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

	usize::try_from(size).unwrap_or(4096)
}

const fn round_up(value: usize, align: usize) -> usize {
	(value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn maps_requested_size() {
		let stack = Stack::new(64 * 1024).unwrap();

		assert!(stack.len() >= 64 * 1024);
		assert!(!stack.top().is_null());
	}

	#[test]
	fn rounds_up_to_page_size() {
		let stack = Stack::new(1).unwrap();

		assert_eq!(stack.len(), page_size());
	}
}
