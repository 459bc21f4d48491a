pub mod cache;
pub mod com;
pub mod config;
pub mod endian;
pub mod error;
pub mod field;
pub mod format;
pub mod header;
pub mod manip;
pub mod reader;
pub mod select;
pub mod sink;
pub mod source;
pub mod stream;
pub mod word_io;
pub mod writer;

pub use cache::FieldCache;
pub use com::{com_shift, ComReport};
pub use config::{CreateOptions, OpenOptions};
pub use endian::ByteOrder;
pub use error::{Result, SnapError, Status};
pub use field::{Field, FieldMask, Kind};
pub use format::{HEADER_SIZE, MAGIC};
pub use header::FrameHeader;
pub use manip::Manipulator;
pub use reader::SnapFileReader;
pub use select::SelectionTable;
pub use sink::SnapshotOut;
pub use source::{Frame, FrameSource, FrameStatus, SourceState};
pub use stream::{FrameRecord, Probe, Tag, TagSink, TagSource};
pub use word_io::WordIo;
pub use writer::SnapFileWriter;
