//! Console command language.
//!
//! ```text
//! gain <index> <db>     set one band
//! zero                  flatten every band
//! add | remove          add or remove the last band
//! volume <db>           set preamp gain
//! apply <on|off>        enable or bypass the equalizer
//! play | pause | next | prev
//! status                print current state
//! disconnect | quit
//! ```

use eqconnect_core::Intent;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Intent(Intent),
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "commands: gain <i> <db>, zero, add, remove, volume <db>, \
apply <on|off>, play, pause, next, prev, status, disconnect, help, quit";

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (name.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("gain", [index, db]) => Command::Intent(Intent::SetFilterGain {
            index: index
                .parse()
                .map_err(|_| format!("invalid band index: {index}"))?,
            gain: decibels(db)?,
            commit: true,
        }),
        ("zero", []) => Command::Intent(Intent::ZeroFilters),
        ("add", []) => Command::Intent(Intent::AddFilter),
        ("remove", []) => Command::Intent(Intent::RemoveFilter),
        ("volume", [db]) => Command::Intent(Intent::SetPreamp {
            gain: decibels(db)?,
            commit: true,
        }),
        ("apply", [flag]) => Command::Intent(Intent::ApplyEqualizer(switch(flag)?)),
        ("play", []) => Command::Intent(Intent::Play),
        ("pause", []) => Command::Intent(Intent::Pause),
        ("next", []) => Command::Intent(Intent::NextTrack),
        ("prev" | "previous", []) => Command::Intent(Intent::PreviousTrack),
        ("disconnect", []) => Command::Intent(Intent::Disconnect),
        ("status", []) => Command::Status,
        ("help" | "?", []) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        (other, _) => return Err(format!("unknown or malformed command: {other}")),
    };
    Ok(Some(command))
}

fn decibels(text: &str) -> Result<f64, String> {
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(format!("invalid gain: {text}")),
    }
}

fn switch(text: &str) -> Result<bool, String> {
    match text.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(format!("expected on or off, got {text}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gain() {
        assert_eq!(
            parse("gain 2 -3.5").unwrap(),
            Some(Command::Intent(Intent::SetFilterGain {
                index: 2,
                gain: -3.5,
                commit: true,
            }))
        );
    }

    #[test]
    fn parses_simple_commands() {
        assert_eq!(
            parse("  PLAY ").unwrap(),
            Some(Command::Intent(Intent::Play))
        );
        assert_eq!(
            parse("apply off").unwrap(),
            Some(Command::Intent(Intent::ApplyEqualizer(false)))
        );
        assert_eq!(
            parse("volume 6").unwrap(),
            Some(Command::Intent(Intent::SetPreamp {
                gain: 6.0,
                commit: true,
            }))
        );
        assert_eq!(parse("quit").unwrap(), Some(Command::Quit));
        assert_eq!(parse("status").unwrap(), Some(Command::Status));
    }

    #[test]
    fn blank_line_is_nothing() {
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse("gain x 1").is_err());
        assert!(parse("gain 1").is_err());
        assert!(parse("volume loud").is_err());
        assert!(parse("apply maybe").is_err());
        assert!(parse("dance").is_err());
    }
}
