//! Line protocol shared by the TCP and UDP transports.
//!
//! Every command is one line of text:
//!
//! - `GET <group> <member>` answers with the member's name or
//!   `ERROR_<group>_<member>`.
//! - `STOP` asks the whole service to shut down.
//! - `STOP_SESSION` ends the current connection.
//!
//! Anything else earns `ERROR_INVALID_INPUT`. Replies carry no separator.

use std::borrow::Cow;

use crate::{config::IdentifierPolicy, directory::Directory};

pub const INVALID_INPUT: &str = "ERROR_INVALID_INPUT";

/// Longest unterminated line a session will hold before giving up on it.
pub const MAX_LINE_LEN: usize = 8 * 1024;

// Legacy C clients terminate every message with a NUL byte, so it ends a
// line just like a newline does.
const LINE_TERMINATORS: &[u8] = b"\n\0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Lookup { group: String, member: String },
    Stop,
    StopSession,
    Invalid,
    Empty,
}

/// Outcome of executing one command, independent of the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Reply(String),
    Silent,
    EndSession,
    Shutdown,
}

impl Command {
    pub fn parse(line: &str, identifiers: IdentifierPolicy) -> Self {
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            return Command::Empty;
        };

        if first.eq_ignore_ascii_case("get") {
            let args: Vec<&str> = tokens.collect();
            return match args.as_slice() {
                [group, member]
                    if is_identifier(group, identifiers) && is_identifier(member, identifiers) =>
                {
                    Command::Lookup {
                        group: group.to_string(),
                        member: member.to_string(),
                    }
                }
                _ => Command::Invalid,
            };
        }

        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("stop") {
            Command::Stop
        } else if trimmed.eq_ignore_ascii_case("stop_session") {
            Command::StopSession
        } else {
            Command::Invalid
        }
    }

    pub fn execute(&self, directory: &Directory) -> Action {
        match self {
            Command::Lookup { group, member } => match directory.lookup(group, member) {
                Some(name) => Action::Reply(name.to_string()),
                None => Action::Reply(format!("ERROR_{group}_{member}")),
            },
            Command::Invalid => Action::Reply(INVALID_INPUT.to_string()),
            Command::Stop => Action::Shutdown,
            Command::StopSession => Action::EndSession,
            Command::Empty => Action::Silent,
        }
    }
}

fn is_identifier(token: &str, identifiers: IdentifierPolicy) -> bool {
    match identifiers {
        IdentifierPolicy::Numeric => {
            !token.is_empty() && token.bytes().all(|byte| byte.is_ascii_digit())
        }
        IdentifierPolicy::Lenient => !token.is_empty(),
    }
}

fn decode(line: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(line)
}

fn is_terminator(byte: &u8) -> bool {
    LINE_TERMINATORS.contains(byte)
}

/// Parses every line of a self-contained payload such as a datagram.
///
/// The payload ends at its first NUL byte; anything after it is ignored. A
/// final line without a terminator still counts.
pub fn commands_in(
    payload: &[u8],
    identifiers: IdentifierPolicy,
) -> impl Iterator<Item = Command> + '_ {
    let end = payload.iter().position(|&byte| byte == 0).unwrap_or(payload.len());
    payload[..end]
        .split(|&byte| byte == b'\n')
        .map(move |line| Command::parse(&decode(line), identifiers))
}

/// Accumulates stream bytes and hands out one command per complete line.
///
/// Reads may split a command anywhere, so nothing is parsed until its
/// terminator has arrived.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    discarding: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Returns the next complete command, if one is buffered.
    ///
    /// A line that outgrows [`MAX_LINE_LEN`] before its terminator shows up is
    /// reported once as [`Command::Invalid`]; the rest of it is dropped.
    pub fn next_command(&mut self, identifiers: IdentifierPolicy) -> Option<Command> {
        loop {
            let Some(end) = self.pending.iter().position(is_terminator) else {
                return self.check_overflow();
            };

            let line: Vec<u8> = self.pending.drain(..=end).collect();
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            return Some(Command::parse(&decode(&line[..end]), identifiers));
        }
    }

    /// Parses whatever is left once the peer has stopped sending.
    pub fn take_remainder(&mut self, identifiers: IdentifierPolicy) -> Option<Command> {
        let rest = std::mem::take(&mut self.pending);
        if std::mem::take(&mut self.discarding) || rest.is_empty() {
            return None;
        }
        Some(Command::parse(&decode(&rest), identifiers))
    }

    fn check_overflow(&mut self) -> Option<Command> {
        if self.pending.len() <= MAX_LINE_LEN {
            return None;
        }
        self.pending.clear();
        if std::mem::replace(&mut self.discarding, true) {
            None
        } else {
            Some(Command::Invalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Command {
        Command::parse(line, IdentifierPolicy::Numeric)
    }

    fn lookup(group: &str, member: &str) -> Command {
        Command::Lookup {
            group: group.into(),
            member: member.into(),
        }
    }

    #[test]
    fn parses_get_case_insensitively() {
        assert_eq!(parse("GET 1 2"), lookup("1", "2"));
        assert_eq!(parse("get 10 20"), lookup("10", "20"));
        assert_eq!(parse("  GeT\t3   4 \r"), lookup("3", "4"));
    }

    #[test]
    fn rejects_malformed_get() {
        assert_eq!(parse("GET"), Command::Invalid);
        assert_eq!(parse("GET 1"), Command::Invalid);
        assert_eq!(parse("GET 1 2 3"), Command::Invalid);
        assert_eq!(parse("GET a 2"), Command::Invalid);
        assert_eq!(parse("GET 1 -2"), Command::Invalid);
        assert_eq!(parse("GETS 1 2"), Command::Invalid);
    }

    #[test]
    fn lenient_identifiers_accept_any_token() {
        assert_eq!(
            Command::parse("GET abc x1", IdentifierPolicy::Lenient),
            lookup("abc", "x1")
        );
        assert_eq!(
            Command::parse("GET abc", IdentifierPolicy::Lenient),
            Command::Invalid
        );
    }

    #[test]
    fn parses_stop_commands() {
        assert_eq!(parse("STOP"), Command::Stop);
        assert_eq!(parse(" stop \r"), Command::Stop);
        assert_eq!(parse("STOP_SESSION"), Command::StopSession);
        assert_eq!(parse("Stop_Session"), Command::StopSession);
        assert_eq!(parse("STOP now"), Command::Invalid);
    }

    #[test]
    fn blank_lines_are_empty() {
        assert_eq!(parse(""), Command::Empty);
        assert_eq!(parse("  \t\r"), Command::Empty);
    }

    #[test]
    fn anything_else_is_invalid() {
        assert_eq!(parse("bogus"), Command::Invalid);
        assert_eq!(parse("HELLO 1 2"), Command::Invalid);
    }

    #[test]
    fn execute_maps_commands_to_actions() {
        let directory: Directory = [("1", "2", "Ada")].into_iter().collect();
        assert_eq!(
            lookup("1", "2").execute(&directory),
            Action::Reply("Ada".into())
        );
        assert_eq!(
            lookup("1", "9").execute(&directory),
            Action::Reply("ERROR_1_9".into())
        );
        assert_eq!(
            Command::Invalid.execute(&directory),
            Action::Reply(INVALID_INPUT.into())
        );
        assert_eq!(Command::Stop.execute(&directory), Action::Shutdown);
        assert_eq!(Command::StopSession.execute(&directory), Action::EndSession);
        assert_eq!(Command::Empty.execute(&directory), Action::Silent);
    }

    #[test]
    fn buffer_waits_for_terminator() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"GE");
        assert_eq!(buffer.next_command(IdentifierPolicy::Numeric), None);
        buffer.extend(b"T 1 ");
        assert_eq!(buffer.next_command(IdentifierPolicy::Numeric), None);
        buffer.extend(b"2\nSTOP");
        assert_eq!(
            buffer.next_command(IdentifierPolicy::Numeric),
            Some(lookup("1", "2"))
        );
        assert_eq!(buffer.next_command(IdentifierPolicy::Numeric), None);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn buffer_yields_commands_in_order() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"GET 1 2\r\nbogus\n\nSTOP_SESSION\n");
        let commands: Vec<_> =
            std::iter::from_fn(|| buffer.next_command(IdentifierPolicy::Numeric)).collect();
        assert_eq!(
            commands,
            vec![
                lookup("1", "2"),
                Command::Invalid,
                Command::Empty,
                Command::StopSession
            ]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn nul_byte_terminates_a_line() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"GET 1 2\n\0GET 3 4\n\0");
        let commands: Vec<_> =
            std::iter::from_fn(|| buffer.next_command(IdentifierPolicy::Numeric)).collect();
        assert_eq!(
            commands,
            vec![
                lookup("1", "2"),
                Command::Empty,
                lookup("3", "4"),
                Command::Empty
            ]
        );
    }

    #[test]
    fn oversized_line_is_reported_once() {
        let mut buffer = LineBuffer::new();
        buffer.extend(&vec![b'x'; MAX_LINE_LEN + 1]);
        assert_eq!(
            buffer.next_command(IdentifierPolicy::Numeric),
            Some(Command::Invalid)
        );
        buffer.extend(&vec![b'x'; MAX_LINE_LEN + 1]);
        assert_eq!(buffer.next_command(IdentifierPolicy::Numeric), None);
        buffer.extend(b"tail\nGET 1 2\n");
        assert_eq!(
            buffer.next_command(IdentifierPolicy::Numeric),
            Some(lookup("1", "2"))
        );
    }

    #[test]
    fn remainder_parses_unterminated_input() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"GET 1 2");
        assert_eq!(buffer.next_command(IdentifierPolicy::Numeric), None);
        assert_eq!(
            buffer.take_remainder(IdentifierPolicy::Numeric),
            Some(lookup("1", "2"))
        );
        assert_eq!(buffer.take_remainder(IdentifierPolicy::Numeric), None);
    }

    #[test]
    fn packet_lines_include_trailing_fragment() {
        let commands: Vec<_> =
            commands_in(b"GET 1 2\nSTOP_SESSION\nGET 3 4", IdentifierPolicy::Numeric).collect();
        assert_eq!(
            commands,
            vec![lookup("1", "2"), Command::StopSession, lookup("3", "4")]
        );
    }

    #[test]
    fn packet_ends_at_first_nul() {
        let commands: Vec<_> =
            commands_in(b"GET 1 2\n\0GET 3 4\n", IdentifierPolicy::Numeric).collect();
        assert_eq!(commands, vec![lookup("1", "2"), Command::Empty]);

        let commands: Vec<_> =
            commands_in(b"GET 1 2\0GET 3 4", IdentifierPolicy::Numeric).collect();
        assert_eq!(commands, vec![lookup("1", "2")]);
    }
}
