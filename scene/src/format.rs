//! Scene graph file format.
//!
//! Graphs, compiled or not, are stored in a small binary container (.rtsg):
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ FIXED HEADER (12 bytes)                                      │
//! │  [0..4]   Magic: b"RTSG"                                     │
//! │  [4..6]   Version: u16 (major << 8 | minor)                  │
//! │  [6..8]   Flags: u16 (reserved)                              │
//! │  [8..12]  Payload length: u32                                │
//! ├──────────────────────────────────────────────────────────────┤
//! │ PAYLOAD (bincode, Zstd compressed)                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little endian.

use std::io::{Cursor, Read, Write};

use cgmath::Point3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::buffers::GeometryBuffers;
use crate::common::{array_to_matrix, matrix_to_array, Aabb};
use crate::{NodeFlags, NodeId, SceneGraph, SceneNode};

// ============================================================================
// Constants
// ============================================================================

/// Magic number identifying scene graph files: "RTSG" in ASCII
pub const MAGIC: [u8; 4] = *b"RTSG";

/// Current format version (major.minor encoded as single u16)
/// major = version >> 8, minor = version & 0xFF
pub const VERSION: u16 = 0x0001; // 0.1

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 12;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while saving or loading a scene graph.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Invalid magic number")]
    InvalidMagic,

    #[error("Unsupported version: {0}.{1}")]
    UnsupportedVersion(u8, u8),

    #[error("Compression error: {0}")]
    CompressionError(String),

    #[error("Decompression error: {0}")]
    DecompressionError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("File truncated: expected {expected} payload bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("Node {node} references missing node {child}")]
    DanglingChild { node: NodeId, child: NodeId },

    #[error("Node {node} references triangles outside the index buffer")]
    InvalidGeometry { node: NodeId },

    #[error("Root {0} is not a node of the graph")]
    InvalidRoot(NodeId),
}

// ============================================================================
// Save Options
// ============================================================================

/// Controls the compression/speed tradeoff for saving graphs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompressionLevel {
    /// Zstd level 1
    Fast,
    /// Zstd level 3
    #[default]
    Default,
    /// Zstd level 19
    Best,
}

impl CompressionLevel {
    pub fn zstd_level(self) -> i32 {
        match self {
            Self::Fast => 1,
            Self::Default => 3,
            Self::Best => 19,
        }
    }
}

// ============================================================================
// File Header
// ============================================================================

/// Fixed-size file header at the start of every .rtsg file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Magic number (must be MAGIC)
    pub magic: [u8; 4],
    /// Format version
    pub version: u16,
    /// Reserved flags
    pub flags: u16,
    /// Length of the compressed payload following the header
    pub payload_len: u32,
}

impl FileHeader {
    pub fn new(payload_len: u32) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            payload_len,
        }
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), FormatError> {
        writer.write_all(&self.magic)?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&self.payload_len.to_le_bytes())?;
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self, FormatError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;

        if magic != MAGIC {
            return Err(FormatError::InvalidMagic);
        }

        let mut version_bytes = [0u8; 2];
        reader.read_exact(&mut version_bytes)?;
        let version = u16::from_le_bytes(version_bytes);

        // Only 0.1 exists so far
        let major = (version >> 8) as u8;
        let minor = (version & 0xFF) as u8;
        if major > 0 || minor > 1 {
            return Err(FormatError::UnsupportedVersion(major, minor));
        }

        let mut flags_bytes = [0u8; 2];
        reader.read_exact(&mut flags_bytes)?;
        let flags = u16::from_le_bytes(flags_bytes);

        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let payload_len = u32::from_le_bytes(len_bytes);

        Ok(Self {
            magic,
            version,
            flags,
            payload_len,
        })
    }
}

// ============================================================================
// Serialized Types
// ============================================================================

/// Serializable node. Ids are arena positions, which are stable across a save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedNode {
    pub name: String,
    pub index: Option<u32>,
    pub level: u32,
    pub flags: u32,
    /// Column-major object-to-world matrix
    pub transform: [[f32; 4]; 4],
    pub index_buffer_index: Option<u32>,
    pub num_triangles: u32,
    pub children: Vec<u32>,
    pub brother: Option<u32>,
    /// Cached bounds as [min, max]
    pub aabb: Option<[[f32; 3]; 2]>,
}

/// Everything stored in a file payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedScene {
    pub root: u32,
    pub nodes: Vec<SerializedNode>,
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl SerializedNode {
    pub fn from_node(node: &SceneNode) -> Self {
        Self {
            name: node.name.clone(),
            index: node.index,
            level: node.level,
            flags: node.flags.bits(),
            transform: matrix_to_array(&node.object_to_world()),
            index_buffer_index: node.index_buffer_index,
            num_triangles: node.num_triangles,
            children: node.children().to_vec(),
            brother: node.brother,
            aabb: node.aabb.map(|b| [b.min.into(), b.max.into()]),
        }
    }

    fn into_node(self, id: NodeId) -> SceneNode {
        let mut node = SceneNode::new(id, self.name);
        node.index = self.index;
        node.level = self.level;
        // Unknown bits from newer writers are dropped
        node.flags = NodeFlags::from_bits_truncate(self.flags);
        node.set_transform(array_to_matrix(self.transform));
        node.index_buffer_index = self.index_buffer_index;
        node.num_triangles = self.num_triangles;
        node.children = self.children;
        node.brother = self.brother;
        node.aabb = self.aabb.map(|[min, max]| Aabb::new(min.into(), max.into()));
        node
    }
}

impl SerializedScene {
    pub fn from_graph(graph: &SceneGraph) -> Self {
        Self {
            root: graph.root(),
            nodes: graph.nodes.iter().map(SerializedNode::from_node).collect(),
            positions: graph.buffers.positions.iter().map(|&p| p.into()).collect(),
            indices: graph.buffers.indices.clone(),
        }
    }

    /// Rebuilds the graph, rejecting references that point outside of it.
    pub fn into_graph(self) -> Result<SceneGraph, FormatError> {
        let len = self.nodes.len() as u32;
        if self.root >= len {
            return Err(FormatError::InvalidRoot(self.root));
        }

        let buffers = GeometryBuffers {
            positions: self.positions.into_iter().map(Point3::from).collect(),
            indices: self.indices,
        };

        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (id, serialized) in self.nodes.into_iter().enumerate() {
            let id = id as NodeId;
            let dangling = serialized
                .children
                .iter()
                .chain(serialized.brother.iter())
                .find(|&&c| c >= len);
            if let Some(&child) = dangling {
                return Err(FormatError::DanglingChild { node: id, child });
            }
            if let Some(start) = serialized.index_buffer_index {
                if !buffers.contains_range(start, serialized.num_triangles) {
                    return Err(FormatError::InvalidGeometry { node: id });
                }
            }
            nodes.push(serialized.into_node(id));
        }

        let mut graph = SceneGraph {
            nodes,
            root: self.root,
            buffers,
        };
        graph.rebuild_parents();
        graph.refresh_counters();
        Ok(graph)
    }
}

// ============================================================================
// Compression Utilities
// ============================================================================

/// Compress data using Zstd with the specified compression level.
pub fn compress_with_level(data: &[u8], level: i32) -> Result<Vec<u8>, FormatError> {
    zstd::encode_all(Cursor::new(data), level)
        .map_err(|e| FormatError::CompressionError(e.to_string()))
}

/// Decompress Zstd-compressed data.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, FormatError> {
    zstd::decode_all(Cursor::new(data))
        .map_err(|e| FormatError::DecompressionError(e.to_string()))
}

// ============================================================================
// Reading/Writing
// ============================================================================

/// Writes a graph as header plus compressed payload.
pub fn write_scene<W: Write>(
    graph: &SceneGraph,
    writer: &mut W,
    level: CompressionLevel,
) -> Result<(), FormatError> {
    let uncompressed = bincode::serialize(&SerializedScene::from_graph(graph))
        .map_err(|e| FormatError::SerializationError(e.to_string()))?;
    let payload = compress_with_level(&uncompressed, level.zstd_level())?;
    let payload_len = u32::try_from(payload.len()).map_err(|_| {
        FormatError::SerializationError(format!("payload of {} bytes too large", payload.len()))
    })?;

    log::debug!(
        "Writing {} nodes, {} -> {} bytes",
        graph.len(),
        uncompressed.len(),
        payload.len()
    );

    FileHeader::new(payload_len).write(writer)?;
    writer.write_all(&payload)?;
    Ok(())
}

/// Reads a graph written by [`write_scene`].
pub fn read_scene<R: Read>(reader: &mut R) -> Result<SceneGraph, FormatError> {
    let header = FileHeader::read(reader)?;

    let expected = header.payload_len as usize;
    let mut payload = Vec::with_capacity(expected);
    reader.take(expected as u64).read_to_end(&mut payload)?;
    if payload.len() < expected {
        return Err(FormatError::Truncated {
            expected,
            found: payload.len(),
        });
    }

    let uncompressed = decompress(&payload)?;
    let scene: SerializedScene = bincode::deserialize(&uncompressed)
        .map_err(|e| FormatError::DeserializationError(e.to_string()))?;
    scene.into_graph()
}

impl SceneGraph {
    /// Serializes the graph to bytes in RTSG format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FormatError> {
        let mut output = Vec::new();
        write_scene(self, &mut output, CompressionLevel::Default)?;
        Ok(output)
    }

    /// Deserializes a graph from RTSG bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<SceneGraph, FormatError> {
        read_scene(&mut Cursor::new(bytes))
    }

    /// Saves the graph to a file.
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), FormatError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Loads a graph from a file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<SceneGraph, FormatError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
