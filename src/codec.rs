//! Merged tree encoding
//!
//! The querier hands every merged tree to a [`TreeCodec`] before returning
//! it. The flame-graph codec used by the UI lives outside this crate; the
//! default [`ProtobufTreeCodec`] emits a plain protobuf message so the bytes
//! can be inspected and round-tripped in tests.
//!
//! # Wire Format
//!
//! ```protobuf
//! message Tree {
//!   repeated Node nodes = 1;
//!   repeated Function functions = 2;
//! }
//!
//! message Node {
//!   uint64 parent_id = 1;
//!   uint64 node_id = 2;
//!   uint64 function_id = 3;
//!   int64 self = 4;
//!   int64 total = 5;
//! }
//!
//! message Function {
//!   uint64 id = 1;
//!   string name = 2;
//! }
//! ```

use prost::Message;

use crate::error::CodecError;
use crate::types::{FunctionEntry, MergedTree, TreeNode};

/// Encodes merged trees for the response
pub trait TreeCodec: Send + Sync {
    /// Codec name, used in logs
    fn name(&self) -> &str;

    /// Encode a merged tree
    fn encode(&self, tree: &MergedTree) -> Result<Vec<u8>, CodecError>;
}

/// Encoded tree
#[derive(Clone, PartialEq, Message)]
pub struct TreeMessage {
    /// Merged nodes
    #[prost(message, repeated, tag = "1")]
    pub nodes: Vec<NodeMessage>,
    /// Function table
    #[prost(message, repeated, tag = "2")]
    pub functions: Vec<FunctionMessage>,
}

/// Encoded tree node
#[derive(Clone, PartialEq, Message)]
pub struct NodeMessage {
    /// Parent node id
    #[prost(uint64, tag = "1")]
    pub parent_id: u64,
    /// Node id
    #[prost(uint64, tag = "2")]
    pub node_id: u64,
    /// Function id
    #[prost(uint64, tag = "3")]
    pub function_id: u64,
    /// Self value
    #[prost(int64, tag = "4")]
    pub self_value: i64,
    /// Total value
    #[prost(int64, tag = "5")]
    pub total_value: i64,
}

/// Encoded function entry
#[derive(Clone, PartialEq, Message)]
pub struct FunctionMessage {
    /// Function id
    #[prost(uint64, tag = "1")]
    pub id: u64,
    /// Symbol name
    #[prost(string, tag = "2")]
    pub name: String,
}

impl From<&MergedTree> for TreeMessage {
    fn from(tree: &MergedTree) -> Self {
        Self {
            nodes: tree
                .nodes
                .iter()
                .map(|n| NodeMessage {
                    parent_id: n.parent_id,
                    node_id: n.node_id,
                    function_id: n.function_id,
                    self_value: n.self_value,
                    total_value: n.total_value,
                })
                .collect(),
            functions: tree
                .functions
                .iter()
                .map(|f| FunctionMessage {
                    id: f.id,
                    name: f.name.clone(),
                })
                .collect(),
        }
    }
}

impl From<TreeMessage> for MergedTree {
    fn from(message: TreeMessage) -> Self {
        Self {
            nodes: message
                .nodes
                .into_iter()
                .map(|n| TreeNode {
                    parent_id: n.parent_id,
                    node_id: n.node_id,
                    function_id: n.function_id,
                    self_value: n.self_value,
                    total_value: n.total_value,
                })
                .collect(),
            functions: message
                .functions
                .into_iter()
                .map(|f| FunctionEntry {
                    id: f.id,
                    name: f.name,
                })
                .collect(),
        }
    }
}

/// Protobuf tree codec
#[derive(Debug, Default, Clone, Copy)]
pub struct ProtobufTreeCodec;

impl ProtobufTreeCodec {
    /// Create a codec
    pub fn new() -> Self {
        Self
    }

    /// Decode bytes produced by [`TreeCodec::encode`]
    pub fn decode(&self, bytes: &[u8]) -> Result<MergedTree, CodecError> {
        TreeMessage::decode(bytes)
            .map(MergedTree::from)
            .map_err(|e| CodecError::Decode(e.to_string()))
    }
}

impl TreeCodec for ProtobufTreeCodec {
    fn name(&self) -> &str {
        "protobuf"
    }

    fn encode(&self, tree: &MergedTree) -> Result<Vec<u8>, CodecError> {
        let message = TreeMessage::from(tree);
        let mut buf = Vec::with_capacity(message.encoded_len());
        message
            .encode(&mut buf)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(buf)
    }
}
