//! Protocol constants for binkp.
//!
//! Wire values follow binkp/1.0 (FTS-1026); timeouts follow the networkb
//! defaults this crate interoperates with.

use std::time::Duration;

// =============================================================================
// PROTOCOL IDENTITY
// =============================================================================

/// Protocol version advertised in the `VER` banner line.
pub const PROTOCOL_VERSION: &str = "binkp/1.0";

/// Product name advertised in the `VER` banner line.
pub const PRODUCT_NAME: &str = "binkp-rs";

/// IANA-registered binkp port.
pub const DEFAULT_PORT: u16 = 24554;

// =============================================================================
// FRAME LAYOUT
// =============================================================================

/// Frame header size (big-endian u16).
pub const FRAME_HEADER_SIZE: usize = 2;

/// Bit 15 of the header marks a command frame.
pub const COMMAND_FLAG: u16 = 0x8000;

/// Bits 0-14 of the header carry the payload length.
pub const LENGTH_MASK: u16 = 0x7fff;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD_SIZE: usize = LENGTH_MASK as usize;

/// Largest argument a command frame can carry (one byte goes to the id).
pub const MAX_COMMAND_ARGUMENT: usize = MAX_PAYLOAD_SIZE - 1;

/// Default data frame size used when streaming a transfer item.
///
/// 1 << 14; half the protocol maximum, which keeps slow links responsive.
pub const DEFAULT_CHUNK_SIZE: usize = 16384;

// =============================================================================
// TIMEOUTS
// =============================================================================

/// Deadline for writing one command frame.
pub const COMMAND_SEND_TIMEOUT: Duration = Duration::from_secs(3);

/// Deadline for writing one data frame.
pub const DATA_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for reading a data frame payload once its header has arrived.
pub const DATA_RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for each handshake wait (address, password, OK).
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for the peer to say anything while we have nothing to send.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Deadline for establishing an outbound TCP connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for the best-effort ERR/BSY written while a session fails.
pub const FAREWELL_TIMEOUT: Duration = Duration::from_millis(500);

// =============================================================================
// WELL-KNOWN ARGUMENTS
// =============================================================================

/// Password sent when none is configured for a node.
pub const EMPTY_PASSWORD: &str = "-";

/// Option token negotiating CRC-32 in FILE lines.
pub const OPT_CRC: &str = "CRC";
