//! Packet-type byte constants for every packet named in spec.md §6. Only
//! the subset C6/C7/C8 actually construct gets a full `Serialize`/
//! `Deserialize` body (`control.rs`/`outbound.rs`/`position.rs`); map
//! file parsing, score/stats, and billing packets are an explicit
//! non-goal (spec.md §1), so their types are listed here for completeness
//! but otherwise unused.

pub const C2S_GOTO_ARENA: u8 = 0x01;
pub const C2S_LEAVE_ARENA: u8 = 0x02;
pub const C2S_LOGIN: u8 = 0x00;
pub const C2S_SPEC_REQUEST: u8 = 0x08;
pub const C2S_SET_SHIP: u8 = 0x18;
pub const C2S_SET_FREQ: u8 = 0x0f;
pub const C2S_DIE: u8 = 0x05;
pub const C2S_GREEN: u8 = 0x07;
pub const C2S_ATTACH_TO: u8 = 0x1d;
pub const C2S_TURRET_KICKOFF: u8 = 0x1c;
pub const C2S_MAP_REQUEST: u8 = 0x0e;
pub const C2S_NEWS_REQUEST: u8 = 0x0d;
pub const C2S_UPDATE_REQUEST: u8 = 0x0b;
pub const C2S_TOUCH_FLAG: u8 = 0x1a;
pub const C2S_DROP_FLAGS: u8 = 0x1f;

pub const S2C_WHO_AM_I: u8 = 0x02;
pub const S2C_LOGIN_RESPONSE: u8 = 0x03;
pub const S2C_CONT_VERSION: u8 = 0x1b;
pub const S2C_LOGIN_TEXT: u8 = 0x29;
pub const S2C_PLAYER_ENTERING: u8 = 0x03;
pub const S2C_ENTERING_ARENA: u8 = 0x06;
pub const S2C_WARP_TO: u8 = 0x26;
pub const S2C_KILL: u8 = 0x07;
pub const S2C_TURRET: u8 = 0x0a;
pub const S2C_TURRET_KICKOFF: u8 = 0x1c;
pub const S2C_FLAG_LOCATION: u8 = 0x12;
pub const S2C_FLAG_PICKUP: u8 = 0x13;
pub const S2C_FLAG_DROP: u8 = 0x1f;
pub const S2C_FLAG_RESET: u8 = 0x22;
pub const S2C_KEEP_ALIVE: u8 = 0x01;
pub const S2C_MAP_FILENAME: u8 = 0x29;
pub const S2C_MAP_DATA: u8 = 0x2a;
pub const S2C_INCOMING_FILE: u8 = 0x10;
pub const S2C_SPEC_DATA: u8 = 0x09;
pub const S2C_SHIP_CHANGE: u8 = 0x23;
pub const S2C_FREQ_CHANGE: u8 = 0x0f;
pub const S2C_SHIP_RESET: u8 = 0x21;
pub const S2C_PRIZE_RECV: u8 = 0x20;
