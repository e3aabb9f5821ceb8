//! Command table shared by the parser and the `help` output.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    Turn,
    Press,
    Release,
    Switch,
    Key,
    Tick,
    Status,
    Timer,
    Servo,
    ResetCombination,
    Help,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tag: CommandTag,
    pub usage: &'static str,
    pub summary: &'static str,
}

pub const COMMANDS: [CommandSpec; 11] = [
    CommandSpec {
        name: "turn",
        tag: CommandTag::Turn,
        usage: "turn cw|ccw [clicks]",
        summary: "rotate the dial one or more detents",
    },
    CommandSpec {
        name: "press",
        tag: CommandTag::Press,
        usage: "press left|right|both",
        summary: "hold buttons down until release",
    },
    CommandSpec {
        name: "release",
        tag: CommandTag::Release,
        usage: "release",
        summary: "let go of every button and key",
    },
    CommandSpec {
        name: "switch",
        tag: CommandTag::Switch,
        usage: "switch left|right left|right",
        summary: "move a slide switch to a position",
    },
    CommandSpec {
        name: "key",
        tag: CommandTag::Key,
        usage: "key <0-15>",
        summary: "hold a keypad key until release",
    },
    CommandSpec {
        name: "tick",
        tag: CommandTag::Tick,
        usage: "tick [count]",
        summary: "run the lock controller",
    },
    CommandSpec {
        name: "status",
        tag: CommandTag::Status,
        usage: "status",
        summary: "show lock state and display",
    },
    CommandSpec {
        name: "timer",
        tag: CommandTag::Timer,
        usage: "timer <1|2> <period_us>",
        summary: "configure a hardware timer",
    },
    CommandSpec {
        name: "servo",
        tag: CommandTag::Servo,
        usage: "servo",
        summary: "position the servo from the panel",
    },
    CommandSpec {
        name: "reset-combination",
        tag: CommandTag::ResetCombination,
        usage: "reset-combination",
        summary: "restore the factory combination",
    },
    CommandSpec {
        name: "help",
        tag: CommandTag::Help,
        usage: "help [command]",
        summary: "list commands or describe one",
    },
];

/// Looks up a command keyword, ignoring ASCII case.
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_commands_case_insensitively() {
        assert_eq!(find("TURN").map(|spec| spec.tag), Some(CommandTag::Turn));
        assert_eq!(
            find("Reset-Combination").map(|spec| spec.tag),
            Some(CommandTag::ResetCombination)
        );
        assert!(find("open").is_none());
    }

    #[test]
    fn usage_starts_with_name() {
        for spec in &COMMANDS {
            assert!(spec.usage.starts_with(spec.name), "{}", spec.name);
        }
    }
}
