//! Program image format produced by [`ProgramToolchain`](super::ProgramToolchain)
//!
//! An image is the magic bytes `RZIM`, a format version byte and the
//! JSON-encoded [`AssemblyImage`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Leading bytes of every image
pub const IMAGE_MAGIC: &[u8; 4] = b"RZIM";

/// Current image format version
pub const IMAGE_VERSION: u8 = 1;

/// Errors raised while decoding an image
#[derive(Debug, Error)]
pub enum ImageError {
    /// The image does not start with [`IMAGE_MAGIC`]
    #[error("Not a template image")]
    BadMagic,

    /// The image was produced by an unsupported format version
    #[error("Unsupported image version: {0}")]
    UnsupportedVersion(u8),

    /// The payload could not be decoded
    #[error("Malformed image: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Value source inside a compiled template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// Constant value
    Const(Value),
    /// Model member, then a path into its value
    Model {
        /// Member read through the model slot
        member: String,
        /// Fields read from the member's value
        path: Vec<String>,
    },
    /// Loop variable, then a path into its value
    Local {
        /// Variable name
        name: String,
        /// Fields read from the variable's value
        path: Vec<String>,
    },
    /// Call to a contract helper
    Call {
        /// Helper name
        helper: String,
        /// Arguments
        args: Vec<Operand>,
    },
}

/// One step of a compiled template body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Write literal text
    Literal(String),
    /// Write an operand's value
    Write(Operand),
    /// Assign a model member
    Set {
        /// Member name
        member: String,
        /// Assigned value
        value: Operand,
    },
    /// Conditional
    Branch {
        /// Condition, evaluated for truthiness
        condition: Operand,
        /// Taken when the condition holds
        then: Vec<Instruction>,
        /// Taken otherwise
        otherwise: Vec<Instruction>,
    },
    /// Loop over an array
    Loop {
        /// Loop variable
        variable: String,
        /// Array operand
        source: Operand,
        /// Body run per item
        body: Vec<Instruction>,
    },
}

/// A compiled template type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinition {
    /// Namespace-qualified type name
    pub name: String,
    /// Contract type in generic syntax
    pub base_type: String,
    /// Body of the entry operation
    pub body: Vec<Instruction>,
}

/// Decoded contents of an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyImage {
    /// Assembly name
    pub name: String,
    /// Types defined by the assembly
    pub types: Vec<TypeDefinition>,
}

impl AssemblyImage {
    /// Encode to image bytes
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let payload = serde_json::to_vec(self)?;
        let mut bytes = Vec::with_capacity(IMAGE_MAGIC.len() + 1 + payload.len());
        bytes.extend_from_slice(IMAGE_MAGIC);
        bytes.push(IMAGE_VERSION);
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decode image bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, ImageError> {
        let payload = bytes
            .strip_prefix(IMAGE_MAGIC.as_slice())
            .ok_or(ImageError::BadMagic)?;
        let (&version, payload) = payload.split_first().ok_or(ImageError::BadMagic)?;
        if version != IMAGE_VERSION {
            return Err(ImageError::UnsupportedVersion(version));
        }
        Ok(serde_json::from_slice(payload)?)
    }
}
