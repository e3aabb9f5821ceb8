use std::io;
use std::path::Path;

#[allow(dead_code)]
#[path = "../board.rs"]
mod board;
#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::Session;

const UNLOCK: &[&str] = &[
    "status",
    "turn cw 37",
    "turn ccw 28",
    "turn cw 6",
    "press left",
    "release",
    "status",
];

const ALARM: &[&str] = &[
    "turn cw 4",
    "turn ccw 1",
    "turn cw 1",
    "press left",
    "release",
    "turn cw 4",
    "turn ccw 1",
    "turn cw 1",
    "press left",
    "release",
    "turn cw 4",
    "turn ccw 1",
    "turn cw 1",
    "press left",
    "release",
    "tick 3",
    "status",
];

const CHANGE: &[&str] = &[
    "turn cw 37",
    "turn ccw 28",
    "turn cw 6",
    "press left",
    "release",
    "switch left right",
    "press right",
    "release",
    "key 0", "release", "key 7", "release",
    "key 1", "release", "key 4", "release",
    "key 0", "release", "key 3", "release",
    "key 0", "release", "key 7", "release",
    "key 1", "release", "key 4", "release",
    "key 0", "release", "key 3", "release",
    "status",
    "switch left left",
    "status",
];

fn main() -> io::Result<()> {
    record("transcripts/unlock.log", UNLOCK)?;
    record("transcripts/alarm.log", ALARM)?;
    record("transcripts/change.log", CHANGE)?;
    Ok(())
}

fn record(path: &str, script: &[&str]) -> io::Result<()> {
    board::COMBINATION.force_reset();
    let mut session = Session::new(Some(Path::new(path)))?;
    for line in script {
        let _ = session.handle_command(line)?;
    }
    Ok(())
}
