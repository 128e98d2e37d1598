//! Host messenger: line-oriented ASCII over the serial link.
//!
//! Inbound lines are at most [`MSG_BUF_LEN`] bytes, newline-terminated, with
//! an optional trailing carriage return. Receiving is a blocking poll with
//! an idle timeout so a half-received line can never wedge the supervisor.

use ufmt::{uWrite, uwrite, uwriteln};

use crate::config::ConfigKey;
use crate::hw::{Clock, HostPort};
use crate::MSG_TIMER_TIMEOUT;

/// Inbound line capacity. Anything longer is an error and is discarded.
pub const MSG_BUF_LEN: usize = 35;

/// A parsed host line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Handshake acknowledgement.
    Ready,
    /// Start one sweep.
    Go,
    /// Parameter change or action request; values stay unparsed here
    /// because their type depends on the key.
    Config {
        key: ConfigKey,
        arg1: Option<&'a str>,
        arg2: Option<&'a str>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError<'a> {
    /// Blank line, ignored without comment.
    Empty,
    /// First token is not a known verb.
    UnknownMessage(&'a str),
    /// `Config` with a key the firmware does not know.
    UnknownConfigKey(&'a str),
    /// `Config` with no key at all.
    MissingConfigKey,
    /// Right key, wrong number of values.
    ArgCount { key: ConfigKey, got: u8 },
}

/// Split one received line into a command. Pure, so the protocol grammar is
/// testable without any I/O.
pub fn parse_line(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let mut tokens = line.split_ascii_whitespace();
    let verb = match tokens.next() {
        Some(v) => v,
        None => return Err(ParseError::Empty),
    };
    match verb {
        "Ready" => Ok(Command::Ready),
        "Go" => Ok(Command::Go),
        // The original host program sends the verb with a trailing colon.
        "Config" | "Config:" => {
            let key_token = match tokens.next() {
                Some(t) => t,
                None => return Err(ParseError::MissingConfigKey),
            };
            let key = match ConfigKey::lookup(key_token) {
                Some(k) => k,
                None => return Err(ParseError::UnknownConfigKey(key_token)),
            };
            let arg1 = tokens.next();
            let arg2 = tokens.next();
            let mut got = arg1.is_some() as u8 + arg2.is_some() as u8;
            // Count any trailing surplus so the error message is honest.
            while tokens.next().is_some() {
                got += 1;
            }
            if got != key.arg_count() {
                return Err(ParseError::ArgCount { key, got });
            }
            Ok(Command::Config { key, arg1, arg2 })
        }
        _ => Err(ParseError::UnknownMessage(line)),
    }
}

/// Receive side of the messenger. One fixed buffer, no allocation.
pub struct Messenger {
    buf: [u8; MSG_BUF_LEN],
    len: usize,
}

impl Messenger {
    pub fn new() -> Self {
        Messenger {
            buf: [0; MSG_BUF_LEN],
            len: 0,
        }
    }

    /// Block until a full line arrives or the idle timeout runs out.
    ///
    /// Returns the line without its terminator (and without a trailing
    /// carriage return). Over-length input is reported on the port and
    /// swallowed up to its newline; the caller just sees no message.
    pub fn read_line<'a, H, C>(&'a mut self, port: &mut H, clock: &mut C) -> Option<&'a str>
    where
        H: HostPort,
        C: Clock,
    {
        self.len = 0;
        let mut idle: u16 = 0;
        let mut overflow = false;
        loop {
            let byte = match port.poll_byte() {
                Some(b) => b,
                None => {
                    idle += 1;
                    if idle >= MSG_TIMER_TIMEOUT {
                        return None; // abandon whatever we have
                    }
                    clock.delay_ms(1);
                    continue;
                }
            };
            idle = 0;
            if byte == b'\n' {
                if overflow {
                    return None;
                }
                let mut end = self.len;
                if end > 0 && self.buf[end - 1] == b'\r' {
                    end -= 1;
                }
                return core::str::from_utf8(&self.buf[..end]).ok();
            }
            if self.len >= MSG_BUF_LEN {
                if !overflow {
                    uwriteln!(port, "ERROR: Host message too long").ok();
                    overflow = true; // discard until the newline
                }
                continue;
            }
            self.buf[self.len] = byte;
            self.len += 1;
        }
    }
}

impl Default for Messenger {
    fn default() -> Self {
        Messenger::new()
    }
}

/// Print a float with exactly four decimals, extracting digits one at a
/// time the way the original tooling expects. A scaled-integer conversion
/// would re-round the value and change the text of stored constants.
pub fn uwrite_float4<W: uWrite>(w: &mut W, value: f32) -> Result<(), W::Error> {
    let mut v = value;
    if v < 0.0 {
        uwrite!(w, "-")?;
        v = -v;
    }
    v += 0.00005; // round the fifth decimal up front
    let int_part = v as u32;
    let mut rem = v - int_part as f32;
    uwrite!(w, "{}.", int_part)?;
    for _ in 0..4 {
        rem *= 10.0;
        let digit = rem as u8;
        uwrite!(w, "{}", digit)?;
        rem -= digit as f32;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{TestClock, TestPort};

    fn float4(value: f32) -> String {
        let mut port = TestPort::new();
        uwrite_float4(&mut port, value).unwrap();
        port.tx_string()
    }

    #[test]
    fn parses_bare_verbs() {
        assert_eq!(parse_line("Ready"), Ok(Command::Ready));
        assert_eq!(parse_line("Go"), Ok(Command::Go));
        assert_eq!(parse_line(""), Err(ParseError::Empty));
    }

    #[test]
    fn parses_config_with_values() {
        assert_eq!(
            parse_line("Config CLK_DIV 8"),
            Ok(Command::Config {
                key: ConfigKey::ClkDiv,
                arg1: Some("8"),
                arg2: None,
            })
        );
        assert_eq!(
            parse_line("Config WRITE_EEPROM 44 1.0"),
            Ok(Command::Config {
                key: ConfigKey::WriteEeprom,
                arg1: Some("44"),
                arg2: Some("1.0"),
            })
        );
        // Colon form used by the original host.
        assert_eq!(
            parse_line("Config: DUMP_EEPROM"),
            Ok(Command::Config {
                key: ConfigKey::DumpEeprom,
                arg1: None,
                arg2: None,
            })
        );
    }

    #[test]
    fn reports_wrong_arity() {
        assert_eq!(
            parse_line("Config CLK_DIV"),
            Err(ParseError::ArgCount {
                key: ConfigKey::ClkDiv,
                got: 0,
            })
        );
        assert_eq!(
            parse_line("Config DUMP_EEPROM 3"),
            Err(ParseError::ArgCount {
                key: ConfigKey::DumpEeprom,
                got: 1,
            })
        );
        assert_eq!(
            parse_line("Config WRITE_EEPROM 44 1.0 9"),
            Err(ParseError::ArgCount {
                key: ConfigKey::WriteEeprom,
                got: 3,
            })
        );
    }

    #[test]
    fn rejects_unknown_input() {
        assert_eq!(
            parse_line("Config FOO 1"),
            Err(ParseError::UnknownConfigKey("FOO"))
        );
        assert_eq!(parse_line("Config"), Err(ParseError::MissingConfigKey));
        assert_eq!(
            parse_line("Hello there"),
            Err(ParseError::UnknownMessage("Hello there"))
        );
    }

    #[test]
    fn read_line_strips_carriage_return() {
        let mut port = TestPort::new();
        let mut clock = TestClock::new();
        port.push_rx(b"Ready\r\n");
        let mut messenger = Messenger::new();
        assert_eq!(messenger.read_line(&mut port, &mut clock), Some("Ready"));
    }

    #[test]
    fn read_line_times_out_on_silence() {
        let mut port = TestPort::new();
        let mut clock = TestClock::new();
        port.push_rx(b"Par"); // partial line, then nothing
        let mut messenger = Messenger::new();
        assert_eq!(messenger.read_line(&mut port, &mut clock), None);
    }

    #[test]
    fn oversize_line_is_reported_and_discarded() {
        let mut port = TestPort::new();
        let mut clock = TestClock::new();
        port.push_rx(&[b'A'; 60]);
        port.push_rx(b"\nGo\n");
        let mut messenger = Messenger::new();
        assert_eq!(messenger.read_line(&mut port, &mut clock), None);
        assert!(port.tx_string().contains("ERROR: Host message too long"));
        // The next line is intact.
        assert_eq!(messenger.read_line(&mut port, &mut clock), Some("Go"));
    }

    #[test]
    fn float4_matches_expected_text() {
        assert_eq!(float4(123456.7890), "123456.7890");
        assert_eq!(float4(0.0), "0.0000");
        assert_eq!(float4(9.0), "9.0000");
        assert_eq!(float4(-1.5), "-1.5000");
        assert_eq!(float4(0.1), "0.1000");
        assert_eq!(float4(2.4816), "2.4816");
    }
}
