use crate::boot::Boot;

/// Jump for Cortex-M parts without TrustZone, relocating the vector table first.
pub struct CortexM;

impl Boot for CortexM {
    unsafe fn boot(vector_table: *const u32) -> ! {
        // SAFETY: writing VTOR only changes where exceptions are dispatched from,
        // and the caller guarantees the table is valid.
        unsafe {
            (*cortex_m::peripheral::SCB::PTR)
                .vtor
                .write(vector_table as u32);
            cortex_m::asm::bootload(vector_table)
        }
    }
}
