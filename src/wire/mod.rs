//! Wire-format layer: RFC 1035 message parsing that preserves byte offsets
//! and localizes errors instead of aborting the whole parse.

pub mod message;
pub mod name;
pub mod parser;
pub mod rdata;
pub mod types;

pub use message::{parse_message, ErrorMark, Message, ParseOptions, Question, RR};
pub use name::Name;
pub use parser::Parser;
pub use rdata::{EdnsOption, Rdata};
pub use types::{flags, DnsClass, Opcode, Rcode, RecordType};
