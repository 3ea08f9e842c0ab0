//! # EntiRel Codec
//!
//! Structured property values and the serializers used for
//! serialized columns.
//!
//! A field property either maps to a scalar table cell or, when its
//! column is declared serialized, is stored as opaque bytes produced by a
//! [`SerializeCodec`]. The engine never interprets those bytes.
//!
//! ## Usage
//!
//! ```
//! use entirel_codec::{CborCodec, SerializeCodec, Value};
//!
//! let options = Value::map([("target", "_blank")]);
//! let bytes = CborCodec.encode(&options).unwrap();
//! assert_eq!(CborCodec.decode(&bytes).unwrap(), options);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod error;
mod value;

pub use codec::{from_cbor, to_cbor, CborCodec, JsonCodec, SerializeCodec};
pub use error::{CodecError, CodecResult};
pub use value::Value;
