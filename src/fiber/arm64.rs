use std::arch::{asm, global_asm};

use super::*;

define_context! {
	pub struct Context {
		x19: usize,
		x29: usize,
		stack: usize,
		link: usize
	}
}

// AAPCS64. `switch` preserves x19/x29 (the two callee-saved registers not
// already covered by the `lateout` clobbers below) plus the stack pointer
// and link register, then jumps into `to` by loading its link register and
// executing `ret` (equivalent to `br x30`), reusing the same instruction
// for both a first-time jump into `start` and resuming a previously
// suspended context.
global_asm!(
	r#"
.text
.globl xx_fiber_arm64_switch
.globl xx_fiber_arm64_start
.globl xx_fiber_arm64_intercept
.type xx_fiber_arm64_switch,%function
.type xx_fiber_arm64_start,%function
.type xx_fiber_arm64_intercept,%function

xx_fiber_arm64_switch:
	mov x2, sp
	str x19, [x0, #0]
	str x29, [x0, #8]
	str x2, [x0, #16]
	str x30, [x0, #24]

	ldr x19, [x1, #0]
	ldr x29, [x1, #8]
	ldr x2, [x1, #16]
	mov sp, x2
	ldr x30, [x1, #24]
	ret

xx_fiber_arm64_start:
	sub x2, sp, #16
	ldp x3, x0, [x2]
	blr x3
	brk #1

xx_fiber_arm64_intercept:
	sub x2, sp, #24
	ldp x3, x0, [x2]
	ldr x4, [x2, #16]
	sub sp, sp, #16
	stp x4, x30, [sp]
	blr x3
	ldp x4, x30, [sp]
	add sp, sp, #16
	br x4
"#
);

extern "C" {
	fn xx_fiber_arm64_start();
	fn xx_fiber_arm64_intercept();
	fn xx_fiber_arm64_switch(from: MutPtr<Context>, to: MutPtr<Context>);
}

impl Context {
	pub fn program_counter(&self) -> Ptr<()> {
		Ptr::from_addr(self.link)
	}

	pub unsafe fn set_stack(&mut self, stack: Ptr<()>, len: usize) {
		#[allow(clippy::arithmetic_side_effects)]
		(self.stack = stack.addr() + len);
	}

	pub unsafe fn set_start(&mut self, start: Start) {
		let stack = MutPtr::<Start>::from_addr(self.stack);

		/* Safety: guaranteed by caller */
		unsafe { stack.sub(1).write(start) };

		self.link = xx_fiber_arm64_start as usize;
	}

	pub unsafe fn set_intercept(&mut self, mut intercept: Intercept) {
		if intercept.ret.is_null() {
			intercept.ret = self.program_counter();
		}

		let stack = MutPtr::<Intercept>::from_addr(self.stack);

		/* Safety: guaranteed by caller */
		unsafe { stack.sub(1).write(intercept) };

		self.link = xx_fiber_arm64_intercept as usize;
	}
}

pub unsafe fn switch(from: MutPtr<Context>, to: MutPtr<Context>) {
	/* Safety: guaranteed by caller */
	unsafe {
		asm!(
			"bl {}",
			sym xx_fiber_arm64_switch,
			in("x0") from.as_ptr(),
			in("x1") to.as_ptr(),
			lateout("x18") _,
			lateout("x20") _,
			lateout("x21") _,
			lateout("x22") _,
			lateout("x23") _,
			lateout("x24") _,
			lateout("x25") _,
			lateout("x26") _,
			lateout("x27") _,
			lateout("x28") _,
			lateout("d8") _,
			lateout("d9") _,
			lateout("d10") _,
			lateout("d11") _,
			lateout("d12") _,
			lateout("d13") _,
			lateout("d14") _,
			lateout("d15") _,
			lateout("d16") _,
			lateout("d17") _,
			lateout("d18") _,
			lateout("d19") _,
			lateout("d20") _,
			lateout("d21") _,
			lateout("d22") _,
			lateout("d23") _,
			lateout("d24") _,
			lateout("d25") _,
			lateout("d26") _,
			lateout("d27") _,
			lateout("d28") _,
			lateout("d29") _,
			lateout("d30") _,
			lateout("d31") _,
			clobber_abi("C")
		);
	}
}
