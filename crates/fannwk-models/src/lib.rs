#![deny(missing_docs)]

//! # FAN NWK Models
//!
//! Wire-level data types and codecs for the field-area network layer that
//! sits between the wireless MAC and the metering application handlers.
//!
//! ## Frame layout
//!
//! ```text
//! version(4) | src-type(2) | dst-type(3) | qos(6) | nh-present(1)
//! [src-address] [dst-address] [next-hop header]
//! src-port(4) | dst-port(4)
//! payload ...
//! ```
//!
//! ## Module layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`bits`] | Big-endian bit pack/unpack at arbitrary offsets, checked cursor |
//! | [`address`] | The five address representations and their codec |
//! | [`port`] | Logical transport ports |
//! | [`qos`] | QoS code table and link parameters |
//! | [`next_hop`] | Source-routing extension header |
//! | [`frame`] | Full frame encode/decode and in-place rewrites |
//! | [`counter`] | Statistics counter identifiers and their dimensions |
//! | [`error`] | Decode / encode error taxonomy |

pub mod address;
pub mod bits;
pub mod counter;
pub mod error;
pub mod frame;
pub mod next_hop;
pub mod port;
pub mod qos;

// Re-export all public types at crate root for convenience.
pub use address::*;
pub use counter::*;
pub use error::*;
pub use frame::*;
pub use next_hop::*;
pub use port::*;
pub use qos::*;
