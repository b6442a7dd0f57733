//! Metadata tables of a Portable PDB.
//!
//! A Portable PDB's `#~` stream carries eight debug tables. Their column widths depend on
//! the heap sizes of the PDB and on the row counts of both the debug tables and the
//! type-system tables of the module being described, which is why [`TableInfo`] spans the
//! whole [`TableId`] space.
//!
//! | Table | Id | Sorted by |
//! |-------|----|-----------|
//! | `Document` | 0x30 | |
//! | `MethodDebugInformation` | 0x31 | parallel to `MethodDef` |
//! | `LocalScope` | 0x32 | method, start offset, length desc |
//! | `LocalVariable` | 0x33 | |
//! | `LocalConstant` | 0x34 | |
//! | `ImportScope` | 0x35 | |
//! | `StateMachineMethod` | 0x36 | move-next method |
//! | `CustomDebugInformation` | 0x37 | parent |
//!
//! Every row type implements [`TableRow`] for both directions.

mod codedindex;
mod customdebuginformation;
mod document;
mod importscope;
mod localconstant;
mod localscope;
mod localvariable;
mod methoddebuginformation;
mod statemachinemethod;
mod tableid;
mod tableinfo;
mod types;

pub use codedindex::CodedIndexType;
pub use customdebuginformation::CustomDebugInformationRaw;
pub use document::DocumentRaw;
pub use importscope::ImportScopeRaw;
pub use localconstant::LocalConstantRaw;
pub use localscope::LocalScopeRaw;
pub use localvariable::LocalVariableRaw;
pub use methoddebuginformation::MethodDebugInformationRaw;
pub use statemachinemethod::StateMachineMethodRaw;
pub use tableid::TableId;
pub use tableinfo::{TableInfo, TableInfoRef};
pub use types::{read_table, write_table, TableRow};

/// Tables whose rows must be sorted, as a `Sorted` bit vector.
pub const SORTED_DEBUG_TABLES: u64 = (1 << TableId::LocalScope as u8)
    | (1 << TableId::StateMachineMethod as u8)
    | (1 << TableId::CustomDebugInformation as u8);
