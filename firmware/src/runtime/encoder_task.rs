use lock_core::encoder::QuadratureDecoder;

use crate::hw::EncoderWipers;

/// Decodes every wiper edge; the lock task drains the latched direction.
#[embassy_executor::task]
pub async fn run(decoder: &'static QuadratureDecoder, mut wipers: EncoderWipers) -> ! {
    decoder.initialize(&mut wipers);
    loop {
        wipers.wait_for_edge().await;
        decoder.handle_interrupt(&mut wipers);
    }
}
