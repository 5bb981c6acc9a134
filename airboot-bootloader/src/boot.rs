// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Hand-off to the installed application.
//!
//! The application executes in place from flash at `APP_ADDR`; nothing is
//! copied. This is the only place the bootloader transfers control.

use airboot_common::layout::FlashLayout;

struct VectorTable {
    initial_sp: u32,
    reset_vector: u32,
}

impl VectorTable {
    unsafe fn read_from(addr: u32) -> Self {
        Self {
            initial_sp: (addr as *const u32).read_volatile(),
            reset_vector: (addr as *const u32).offset(1).read_volatile(),
        }
    }
}

/// Jump into the application image of `layout`.
///
/// # Safety
/// The caller must have released every peripheral it configured that the
/// application does not expect to find running. Flash content at the
/// application address is not validated.
pub unsafe fn jump_to_application(layout: &FlashLayout) -> ! {
    let app_addr = layout.app_addr();
    let vt = VectorTable::read_from(app_addr);

    defmt::println!(
        "Jumping to application at 0x{:08x} (sp=0x{:08x}, reset=0x{:08x})",
        app_addr,
        vt.initial_sp,
        vt.reset_vector
    );

    prepare_for_application_handoff();
    relocate_vector_table(app_addr);
    jump(vt.initial_sp, vt.reset_vector)
}

/// Interrupts off, nothing pending, nothing enabled.
unsafe fn prepare_for_application_handoff() {
    cortex_m::interrupt::disable();

    const NVIC_ICPR: *mut u32 = 0xE000_E280 as *mut u32;
    NVIC_ICPR.write_volatile(0xFFFF_FFFF);

    const NVIC_ICER: *mut u32 = 0xE000_E180 as *mut u32;
    NVIC_ICER.write_volatile(0xFFFF_FFFF);
}

unsafe fn relocate_vector_table(base: u32) {
    const SCB_VTOR: *mut u32 = 0xE000_ED08 as *mut u32;
    SCB_VTOR.write_volatile(base);

    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

unsafe fn jump(initial_sp: u32, reset_vector: u32) -> ! {
    core::arch::asm!(
        "msr msp, {sp}",
        "cpsie i",
        "bx {reset}",
        sp = in(reg) initial_sp,
        reset = in(reg) reset_vector,
        options(noreturn)
    );
}
