//! Low-level codecs: bit-packing, LEB128 varints and the bounds-checked
//! byte cursor every decoder reads through.

pub mod bitpack;
pub mod cursor;
pub mod leb128;

pub use bitpack::{bits_required, packed_size, BitPackDecoder, BitPackEncoder};
pub use cursor::ByteCursor;
pub use leb128::{decode_varint, encode_varint, zigzag_decode, zigzag_encode};
