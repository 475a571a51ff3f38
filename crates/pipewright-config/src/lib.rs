//! Pipewright Config
//!
//! This crate contains the serializable pipeline definition types for
//! pipewright. These types describe a pipeline before it is built into
//! runtime stages and executables.
//!
//! Definitions are loaded from JSON files by the CLI:
//!
//! ```json
//! {
//!   "id": "word-stats",
//!   "stages": [
//!     {
//!       "name": "partition",
//!       "executables": [
//!         {
//!           "name": "part_1",
//!           "kind": "files",
//!           "program": { "type": "file", "path": "tasks/partition.sh" },
//!           "args": [
//!             { "type": "literal", "values": ["I,you,we"] },
//!             { "type": "file", "path": "inputs/text-1.txt" }
//!           ]
//!         }
//!       ]
//!     },
//!     {
//!       "name": "count",
//!       "executables": [
//!         {
//!           "name": "count_you",
//!           "program": { "type": "file", "path": "tasks/count.sh" },
//!           "args": [
//!             { "type": "output", "stage": "partition", "executable": "part_1", "item": 1 }
//!           ]
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```

mod executable;
mod input;
mod pipeline;

pub use executable::{ExecutableDef, ExecutableKind};
pub use input::InputDef;
pub use pipeline::{PipelineDef, StageDef};
