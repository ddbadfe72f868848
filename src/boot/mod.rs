#[cfg(feature = "cortex_m")]
pub mod cortex_m;

/// Transfer of control into an installed image.
///
/// Implementations may additionally drop privileges or reconfigure memory protection
/// before jumping.
pub trait Boot {
    /// Jump to the image whose vector table starts at `vector_table`.
    ///
    /// # Safety
    /// `vector_table` must point at a valid, programmed vector table.
    unsafe fn boot(vector_table: *const u32) -> !;
}
