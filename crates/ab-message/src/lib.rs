//! `ab-message` — message storage and spatial partitioning.
//!
//! # Crate layout
//!
//! | Module    | Contents                                                          |
//! |-----------|-------------------------------------------------------------------|
//! | [`kind`]  | `MessageKind`, `MessageType`, `SpatialBounds`                     |
//! | [`grid`]  | `SpatialGrid` — fixed bin grid derived from bounds and radius     |
//! | [`index`] | `MessageIndex` — Partition Boundary Matrix (PBM) build and query  |
//! | [`list`]  | `MessageList` — read/write double buffer, publish + index rebuild |
//! | [`error`] | `MessageError`, `MessageResult<T>`                                |
//!
//! # Data layout
//!
//! The PBM is a CSR row pointer over spatial bins.  After a build, the
//! messages in bin `b` are
//!
//! ```text
//! vals[ pbm[b] .. pbm[b+1] ]
//! ```
//!
//! so a neighbourhood query is a handful of contiguous scans, one per row
//! of adjacent bins.
//!
//! # Feature flags
//!
//! | Flag    | Effect                                             |
//! |---------|----------------------------------------------------|
//! | `serde` | Derives `Serialize`/`Deserialize` on public types. |

pub mod error;
pub mod grid;
pub mod index;
pub mod kind;
pub mod list;


pub use error::{MessageError, MessageResult};
pub use grid::SpatialGrid;
pub use index::{IndexState, MessageIndex};
pub use kind::{LOCATION_VARIABLES, MessageKind, MessageType, SpatialBounds};
pub use list::MessageList;
