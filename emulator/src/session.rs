use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use lock_core::console::{ButtonSelection, Command, Side, parse, write_help};
use lock_core::display::{LOCK_DISPLAY, RowDisplay};
use lock_core::lock::{LockController, LockState};
use lock_core::servo::Servo;
use lock_core::telemetry::{LockEvent, TelemetryRecorder};
use lock_core::timer::{PeriodicTimers, TimerBank, TimerId, TimerMode, TimerVector};

use crate::board::{
    self, COMBINATION, DECODER, SERVO_PWM_STATE, SimulatedPanel, SimulatedTimers, VirtualDelay,
    VirtualTicker,
};

/// Virtual time one pass of the main loop takes.
const LOOP_PERIOD: Duration = Duration::from_millis(10);

/// Periodic timer slot the servo PWM runs on.
const SERVO_TIMER: usize = 0;

type EmulatedLock = LockController<'static, SimulatedPanel, RowDisplay, VirtualDelay>;

pub struct Session {
    lock: EmulatedLock,
    timers: TimerBank<SimulatedTimers>,
    periodic: PeriodicTimers<VirtualTicker, 1>,
    telemetry: TelemetryRecorder<Duration>,
    transcript: Option<TranscriptLogger>,
    loop_ticks: u64,
}

impl Session {
    pub fn new(transcript: Option<&Path>) -> io::Result<Self> {
        let transcript = transcript.map(TranscriptLogger::new).transpose()?;
        let panel = SimulatedPanel {
            left_switch_left: true,
            right_switch_left: true,
            ..SimulatedPanel::default()
        };

        let servo = Servo::new(&SERVO_PWM_STATE);
        let mut periodic = PeriodicTimers::new([VirtualTicker::default()]);
        servo.initialize(&mut periodic, SERVO_TIMER, board::servo_tick);

        let lock = LockController::new(
            panel,
            RowDisplay::new(LOCK_DISPLAY),
            VirtualDelay::default(),
            &DECODER,
            servo,
            &COMBINATION,
        );

        let mut session = Self {
            lock,
            timers: TimerBank::new(SimulatedTimers::default()),
            periodic,
            telemetry: TelemetryRecorder::new(),
            transcript,
            loop_ticks: 0,
        };
        // wipers rest at HIGH_HIGH between detents
        DECODER.process_code(0b11);
        let events = session.lock.initialize();
        session.record(&events);
        Ok(session)
    }

    /// Virtual time since power-on: loop passes plus time spent blinking.
    pub fn now(&self) -> Duration {
        let ticks = u32::try_from(self.loop_ticks).unwrap_or(u32::MAX);
        LOOP_PERIOD * ticks + self.lock.delay().elapsed()
    }

    pub fn state(&self) -> LockState {
        self.lock.state()
    }

    /// Events recorded since power-on, oldest first, bounded by the ring size.
    pub fn history(&self) -> Vec<LockEvent> {
        self.telemetry
            .oldest_first()
            .map(|record| record.event)
            .collect()
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        let at = self.now();
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.append_line(at, TranscriptRole::Host, trimmed)?;
        }

        let lines = match parse(trimmed) {
            Ok(command) => self.execute(command),
            Err(err) => vec![format!("ERR syntax {err}")],
        };

        let at = self.now();
        if let Some(transcript) = self.transcript.as_mut() {
            for line in &lines {
                transcript.append_line(at, TranscriptRole::Emulator, line)?;
            }
        }
        Ok(lines)
    }

    fn execute(&mut self, command: Command<'_>) -> Vec<String> {
        match command {
            Command::Turn { direction, clicks } => {
                let mut lines = Vec::new();
                for _ in 0..clicks {
                    board::turn_detent(direction);
                    lines.extend(self.tick());
                }
                lines
            }
            Command::Press(selection) => {
                let panel = self.lock.panel_mut();
                match selection {
                    ButtonSelection::Left => panel.left_button = true,
                    ButtonSelection::Right => panel.right_button = true,
                    ButtonSelection::Both => {
                        panel.left_button = true;
                        panel.right_button = true;
                    }
                }
                self.tick()
            }
            Command::Release => {
                self.lock.panel_mut().release_all();
                self.tick()
            }
            Command::Switch { switch, position } => {
                let in_left = position == Side::Left;
                let panel = self.lock.panel_mut();
                match switch {
                    Side::Left => panel.left_switch_left = in_left,
                    Side::Right => panel.right_switch_left = in_left,
                }
                self.tick()
            }
            Command::Key(key) => {
                self.lock.panel_mut().key = Some(key);
                self.tick()
            }
            Command::Tick(count) => {
                let mut lines = Vec::new();
                for _ in 0..count {
                    lines.extend(self.tick());
                }
                lines
            }
            Command::Status => self.status(),
            Command::Timer { timer, period_us } => self.configure_timer(timer, period_us),
            Command::Servo => {
                let position = self.lock.exercise_servo();
                vec![format!("OK servo {position}")]
            }
            Command::ResetCombination => {
                self.lock.force_combination_reset();
                let events = [LockEvent::CombinationReset];
                self.record(&events)
            }
            Command::Help { topic } => {
                let mut text = String::new();
                let _ = write_help(&mut text, topic);
                text.lines().map(str::to_string).collect()
            }
        }
    }

    /// One pass of the main loop.
    fn tick(&mut self) -> Vec<String> {
        self.loop_ticks += 1;
        let events = self.lock.control_lock();
        if let Some(ticker) = self.periodic.ticker(SERVO_TIMER) {
            ticker.run_for(LOOP_PERIOD);
        }
        self.record(&events)
    }

    fn record(&mut self, events: &[LockEvent]) -> Vec<String> {
        let at = self.now();
        events
            .iter()
            .map(|event| {
                let id = self.telemetry.record(*event, at);
                let mut line = format!("EVT #{id} {event}");
                if let Some(elapsed) = self
                    .telemetry
                    .latest()
                    .and_then(|record| record.since_last_transition)
                {
                    let _ = write!(line, " (+{}ms)", elapsed.as_millis());
                }
                line
            })
            .collect()
    }

    fn status(&self) -> Vec<String> {
        let panel = self.lock.panel();
        let mut lines = vec![
            format!(
                "OK state={} bad-tries={} combination={}",
                self.lock.state(),
                self.lock.bad_tries(),
                self.lock.get_combination()
            ),
            format!(
                "leds left={} right={} encoder {}",
                on_off(panel.left_led),
                on_off(panel.right_led),
                DECODER.count_rotations()
            ),
        ];

        let width = SERVO_PWM_STATE.pulse_width_us();
        let measured = self
            .periodic
            .ticker(SERVO_TIMER)
            .map_or(0, board::measure_servo_frame);
        let position = self
            .lock
            .servo()
            .position()
            .map_or_else(|| "custom".to_string(), |position| position.to_string());
        lines.push(format!("servo {position} width={width}us measured={measured}us"));

        let geometry = self.lock.display().geometry();
        let border = "-".repeat(usize::from(geometry.columns));
        lines.push(format!("+{border}+"));
        for row in self.lock.display().visible_rows() {
            lines.push(format!("|{row}|"));
        }
        lines.push(format!("+{border}+"));
        lines
    }

    #[allow(clippy::cast_precision_loss)]
    fn configure_timer(&mut self, timer: u8, period_us: u32) -> Vec<String> {
        // console periods are whole microseconds; all reachable ones are exact in f32
        let actual = match self.timers.configure_timer(timer, period_us as f32) {
            Ok(actual) => actual,
            Err(err) => return vec![format!("ERR timer {err}")],
        };
        self.timers
            .register_timer_isr(timer, 0, board::count_timer_interrupt);

        let Some(id) = TimerId::from_number(timer) else {
            return vec![format!("ERR timer {timer}")];
        };
        let mut lines = vec![format!("OK timer {timer} actual={actual:.3}us")];
        if let Some(configuration) = self.timers.configuration(id) {
            let image = self.timers.registers().image(id);
            lines.push(format!(
                "  prescaler=/{} count={} mode={:?} top={} compare-a={} compare-b={}",
                configuration.fit.prescaler,
                configuration.fit.count,
                configuration.mode,
                configuration.top,
                image.compare_a,
                image.compare_b,
            ));
            lines.push(format!(
                "  control=[{:#04x}, {:#04x}] interrupt-mask={:#05b} slots={}",
                image.control[0],
                image.control[1],
                image.interrupt_mask,
                self.timers.isr_slots(id),
            ));
            // fire slot 0 once to prove the vector is wired
            let vector = match configuration.mode {
                TimerMode::Normal => TimerVector::Overflow,
                TimerMode::Ctc => TimerVector::CompareA,
            };
            self.timers.dispatch(id, vector);
            lines.push(format!("  {vector:?} fired, irqs={}", board::timer_interrupts()));
        }
        lines
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

/// Parses the `--combination a,b,c` argument.
pub fn parse_combination(text: &str) -> Result<lock_core::lock::Combination, String> {
    let mut digits = [0u8; lock_core::lock::COMBINATION_LEN];
    let mut parts = text.split(',');
    for digit in &mut digits {
        let part = parts
            .next()
            .ok_or_else(|| format!("combination `{text}` needs three digits"))?;
        *digit = part
            .trim()
            .parse()
            .map_err(|_| format!("`{part}` is not a dial position"))?;
    }
    if parts.next().is_some() {
        return Err(format!("combination `{text}` has more than three digits"));
    }
    lock_core::lock::Combination::new(digits).map_err(|err| err.to_string())
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        logger.write_header()?;
        Ok(logger)
    }

    fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.writer, "# Combination lock emulator transcript")?;
        writeln!(
            self.writer,
            "# Timestamps are virtual milliseconds since power-on"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(&mut self, at: Duration, role: TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            at.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_combination_argument() {
        assert_eq!(
            parse_combination("7, 14,3").map(|combination| combination.digits()),
            Ok([7, 14, 3])
        );
        assert!(parse_combination("7,14").is_err());
        assert!(parse_combination("7,14,3,1").is_err());
        assert!(parse_combination("7,16,3").is_err());
        assert!(parse_combination("a,1,2").is_err());
    }

    // The only test that touches the board statics.
    #[test]
    fn console_session_unlocks_with_default_combination() {
        COMBINATION.force_reset();
        let mut session = Session::new(None).expect("session");

        for line in ["turn cw 37", "turn ccw 28", "turn cw 6", "press left", "release"] {
            session.handle_command(line).expect("no transcript io");
        }
        assert_eq!(session.state(), LockState::Unlocked);
        assert!(session.history().contains(&LockEvent::StateChanged {
            from: LockState::Locked,
            to: LockState::Unlocked,
        }));

        let status = session.handle_command("status").expect("no transcript io");
        assert!(status[0].starts_with("OK state=unlocked bad-tries=0"));
        assert!(status[2].contains("width=2500us measured=2500us"));
        assert_eq!(status[4], "|OPEN            |");

        let rejected = session.handle_command("turn left").expect("no transcript io");
        assert!(rejected[0].starts_with("ERR syntax"));
    }
}
