//! Chat-protocol line codec (spec.md §6, SPEC_FULL.md §C.2): parses the
//! inbound `LOGIN:`/`GO:`/`LEAVE` lines and formats the outbound
//! `LOGINOK:`/`LOGINBAD:`/`INARENA:`/`PLAYER:`/`ENTERING:`/`LEAVING:`/
//! `MSG:ARENA:` lines a chat-text client exchanges over the line-oriented
//! protocol. Command parsing and chat routing beyond this wire format are
//! an explicit non-goal (spec.md §1); this module only turns bytes into
//! the handful of structured requests C6/C7 need.

use crate::player::Ship;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InboundChatLine {
    Login { version: String, info: Option<String>, name: String, password: String },
    Go { arena: String },
    Leave,
}

/// Parses one inbound chat-protocol line. Malformed `LOGIN:`/`GO:` lines
/// (wrong field count) return `None`; the caller treats that as a
/// malicious/garbage line per spec.md §7 and drops it without a response.
pub fn parse_inbound(line: &str) -> Option<InboundChatLine> {
    let line = line.trim_end_matches(['\r', '\n']);

    if line == "LEAVE" {
        return Some(InboundChatLine::Leave);
    }

    if let Some(rest) = line.strip_prefix("GO:") {
        if rest.is_empty() {
            return None;
        }
        return Some(InboundChatLine::Go { arena: rest.to_string() });
    }

    if let Some(rest) = line.strip_prefix("LOGIN:") {
        // `<ver>[;<info>]:<name>:<password>` — password may itself contain
        // `:`, so split into at most 3 parts after the version field.
        let mut parts = rest.splitn(3, ':');
        let ver_field = parts.next()?;
        let name = parts.next()?;
        let password = parts.next()?;

        let (version, info) = match ver_field.split_once(';') {
            Some((v, i)) => (v.to_string(), Some(i.to_string())),
            None => (ver_field.to_string(), None),
        };

        if name.is_empty() {
            return None;
        }

        return Some(InboundChatLine::Login {
            version,
            info,
            name: name.to_string(),
            password: password.to_string(),
        });
    }

    None
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OutboundChatLine<'a> {
    LoginOk { name: &'a str },
    LoginBad { reason: &'a str },
    InArena { arena: &'a str, freq: u16 },
    Player { name: &'a str, ship: Ship, freq: u16 },
    Entering { name: &'a str, ship: Ship, freq: u16 },
    Leaving { name: &'a str },
    MsgArena { text: &'a str },
}

/// Ship index as the chat protocol encodes it: `0`..`7` for the flyable
/// ships, `8` for spectator (spec.md §3's "8 values including spectator").
fn ship_index(ship: Ship) -> u8 {
    match ship {
        Ship::Warbird => 0,
        Ship::Javelin => 1,
        Ship::Spider => 2,
        Ship::Leviathan => 3,
        Ship::Terrier => 4,
        Ship::Weasel => 5,
        Ship::Lancaster => 6,
        Ship::Shark => 7,
        Ship::Spectator => 8,
    }
}

impl<'a> OutboundChatLine<'a> {
    pub fn format(&self) -> String {
        match self {
            OutboundChatLine::LoginOk { name } => format!("LOGINOK:{name}"),
            OutboundChatLine::LoginBad { reason } => format!("LOGINBAD:{reason}"),
            OutboundChatLine::InArena { arena, freq } => format!("INARENA:{arena}:{freq}"),
            OutboundChatLine::Player { name, ship, freq } => format!("PLAYER:{name}:{}:{freq}", ship_index(*ship)),
            OutboundChatLine::Entering { name, ship, freq } => format!("ENTERING:{name}:{}:{freq}", ship_index(*ship)),
            OutboundChatLine::Leaving { name } => format!("LEAVING:{name}"),
            OutboundChatLine::MsgArena { text } => format!("MSG:ARENA:{text}"),
        }
    }
}
