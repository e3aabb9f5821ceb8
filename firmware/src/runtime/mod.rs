//! Board bring-up and task wiring.
//!
//! The lock controller runs on the thread-mode executor and busy-waits through
//! its blink delays. The encoder and servo tasks run on an interrupt executor
//! so they keep preempting it.

use core::cell::RefCell;

use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32 as hal;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use lock_core::encoder::QuadratureDecoder;
use lock_core::lock::RetainedCombination;
use lock_core::pwm::{SERVO_PWM, SoftPwm};

use crate::hw::{EncoderWipers, FrontPanel, Keypad, ServoPin};

mod encoder_task;
mod lock_task;
mod servo_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) static DECODER: QuadratureDecoder = QuadratureDecoder::new();
pub(super) static SERVO_PWM_STATE: SoftPwm = SoftPwm::new(SERVO_PWM);
pub(super) static SERVO_PIN: Mutex<CriticalSectionRawMutex, RefCell<Option<ServoPin>>> =
    Mutex::new(RefCell::new(None));
pub(super) static SERVO_TICKER: servo_task::TickerSignal = servo_task::TickerSignal::new();

/// Kept out of `.bss` so a warm reset preserves it; `initialize` validates
/// whatever it finds after a cold start.
#[unsafe(link_section = ".uninit.combination")]
pub(super) static COMBINATION: RetainedCombination = RetainedCombination::new();

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[hal::interrupt]
unsafe fn SPI2_3() {
    unsafe { EXECUTOR_HIGH.on_interrupt() }
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA5,
        PA6,
        PA8,
        PB0,
        PB1,
        PB2,
        PB3,
        PB6,
        PB7,
        PB8,
        PB9,
        PD0,
        PD1,
        PD2,
        PD3,
        EXTI0,
        EXTI1,
        ..
    } = hal::init(config);

    let wipers = EncoderWipers::new(
        ExtiInput::new(PA0, EXTI0, Pull::Up),
        ExtiInput::new(PA1, EXTI1, Pull::Up),
    );
    SERVO_PIN.lock(|pin| {
        *pin.borrow_mut() = Some(ServoPin::new(Output::new(PA8, Level::Low, Speed::Low)));
    });

    let panel = FrontPanel {
        left_button: Input::new(PB0, Pull::Up),
        right_button: Input::new(PB1, Pull::Up),
        left_switch: Input::new(PB2, Pull::Up),
        right_switch: Input::new(PB3, Pull::Up),
        left_led: Output::new(PA5, Level::Low, Speed::Low),
        right_led: Output::new(PA6, Level::Low, Speed::Low),
        keypad: Keypad::new(
            [
                Output::new(PB6, Level::High, Speed::Low),
                Output::new(PB7, Level::High, Speed::Low),
                Output::new(PB8, Level::High, Speed::Low),
                Output::new(PB9, Level::High, Speed::Low),
            ],
            [
                Input::new(PD0, Pull::Up),
                Input::new(PD1, Pull::Up),
                Input::new(PD2, Pull::Up),
                Input::new(PD3, Pull::Up),
            ],
        ),
    };

    hal::interrupt::SPI2_3.set_priority(Priority::P1);
    let high_spawner = EXECUTOR_HIGH.start(hal::interrupt::SPI2_3);

    high_spawner
        .spawn(encoder_task::run(&DECODER, wipers))
        .expect("failed to spawn encoder task");
    high_spawner
        .spawn(servo_task::run(&SERVO_TICKER))
        .expect("failed to spawn servo task");

    spawner
        .spawn(lock_task::run(panel))
        .expect("failed to spawn lock task");

    core::future::pending::<()>().await;
}
