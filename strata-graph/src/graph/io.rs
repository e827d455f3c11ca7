//! Graph Loading
//!
//! Two on-disk formats, selected by the driver's `-b` flag:
//!
//! - ASCII adjacency: an `AdjacencyGraph` (or `WeightedAdjacencyGraph`)
//!   header line, then `n`, `m`, `n` row offsets, `m` targets, and for the
//!   weighted variant `m` integer weights, all whitespace-separated.
//! - Binary: little-endian `u64` `n` and `m`, then `n` `u64` offsets, `m`
//!   `u32` targets, and for weighted files `m` `i32` weights.
//!
//! Validation happens here, before the runtime sees the graph; the engine
//! itself treats malformed input as undefined.

use std::fs;
use std::path::Path;

use super::{Csr, Graph, VertexId};

/// Errors raised while reading a graph file.
#[derive(Debug)]
pub enum LoadError {
    /// Underlying I/O failure.
    Io(std::io::Error),
    /// The header line named an unknown format.
    BadHeader(String),
    /// A token failed to parse as the expected integer type.
    BadToken {
        /// Position in the token stream.
        index: usize,
    },
    /// The file ended before the declared counts were satisfied.
    Truncated,
    /// Offsets were not monotonically non-decreasing within `[0, m]`.
    BadOffsets,
    /// An edge target was outside `[0, n)`.
    BadTarget {
        /// The offending vertex id.
        target: u64,
    },
}

impl core::fmt::Display for LoadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "i/o error: {}", e),
            LoadError::BadHeader(h) => write!(f, "unknown graph header {:?}", h),
            LoadError::BadToken { index } => write!(f, "unparsable token at position {}", index),
            LoadError::Truncated => write!(f, "file shorter than declared counts"),
            LoadError::BadOffsets => write!(f, "row offsets not monotone within bounds"),
            LoadError::BadTarget { target } => write!(f, "edge target {} out of range", target),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}

/// Result type for loading operations.
pub type Result<T> = core::result::Result<T, LoadError>;

/// Reads a graph file.
///
/// `symmetric` declares the adjacency to be undirected (one CSR serves both
/// directions); otherwise the reverse CSR is derived by transposition.
/// `binary` selects the binary layout over ASCII.
pub fn load_graph(path: &Path, symmetric: bool, binary: bool) -> Result<Graph> {
    let (csr, weighted) = if binary {
        read_binary(path)?
    } else {
        read_ascii(path)?
    };
    Ok(if symmetric {
        Graph::symmetric(csr, weighted)
    } else {
        Graph::asymmetric(csr, weighted)
    })
}

fn read_ascii(path: &Path) -> Result<(Csr, bool)> {
    let text = fs::read_to_string(path)?;
    let mut tokens = text.split_whitespace();

    let header = tokens.next().ok_or(LoadError::Truncated)?;
    let weighted = match header {
        "AdjacencyGraph" => false,
        "WeightedAdjacencyGraph" => true,
        other => return Err(LoadError::BadHeader(other.to_string())),
    };

    let mut index = 1usize;
    let mut next_u64 = |tokens: &mut dyn Iterator<Item = &str>| -> Result<u64> {
        let tok = tokens.next().ok_or(LoadError::Truncated)?;
        let v = tok
            .parse::<i64>()
            .map_err(|_| LoadError::BadToken { index })?;
        index += 1;
        u64::try_from(v).map_err(|_| LoadError::BadToken { index: index - 1 })
    };

    let n = next_u64(&mut tokens)? as usize;
    let m = next_u64(&mut tokens)? as usize;

    let mut offsets = Vec::with_capacity(n + 1);
    for _ in 0..n {
        offsets.push(next_u64(&mut tokens)? as usize);
    }
    offsets.push(m);
    check_offsets(&offsets, m)?;

    let mut targets = Vec::with_capacity(m);
    for _ in 0..m {
        let t = next_u64(&mut tokens)?;
        if t >= n as u64 {
            return Err(LoadError::BadTarget { target: t });
        }
        targets.push(t as VertexId);
    }

    let weights = if weighted {
        let mut w = Vec::with_capacity(m);
        for _ in 0..m {
            let tok = tokens.next().ok_or(LoadError::Truncated)?;
            w.push(tok.parse::<i32>().map_err(|_| LoadError::BadToken { index })?);
            index += 1;
        }
        w
    } else {
        vec![1; m]
    };

    Ok((
        Csr::from_parts(
            offsets.into_boxed_slice(),
            targets.into_boxed_slice(),
            weights.into_boxed_slice(),
        ),
        weighted,
    ))
}

fn read_binary(path: &Path) -> Result<(Csr, bool)> {
    let bytes = fs::read(path)?;
    let mut cursor = Cursor {
        bytes: &bytes,
        pos: 0,
    };

    let n = cursor.u64()? as usize;
    let m = cursor.u64()? as usize;

    let mut offsets = Vec::with_capacity(n + 1);
    for _ in 0..n {
        offsets.push(cursor.u64()? as usize);
    }
    offsets.push(m);
    check_offsets(&offsets, m)?;

    let mut targets = Vec::with_capacity(m);
    for _ in 0..m {
        let t = cursor.u32()?;
        if t as usize >= n {
            return Err(LoadError::BadTarget { target: t as u64 });
        }
        targets.push(t);
    }

    // trailing weight section marks a weighted file
    let weighted = cursor.remaining() >= m * 4 && m > 0;
    let weights = if weighted {
        let mut w = Vec::with_capacity(m);
        for _ in 0..m {
            w.push(cursor.u32()? as i32);
        }
        w
    } else {
        vec![1; m]
    };

    Ok((
        Csr::from_parts(
            offsets.into_boxed_slice(),
            targets.into_boxed_slice(),
            weights.into_boxed_slice(),
        ),
        weighted,
    ))
}

fn check_offsets(offsets: &[usize], m: usize) -> Result<()> {
    let monotone = offsets.windows(2).all(|w| w[0] <= w[1]);
    if !monotone || offsets.first().copied().unwrap_or(0) != 0 || offsets.iter().any(|&o| o > m) {
        return Err(LoadError::BadOffsets);
    }
    Ok(())
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn u64(&mut self) -> Result<u64> {
        let end = self.pos + 8;
        let chunk = self.bytes.get(self.pos..end).ok_or(LoadError::Truncated)?;
        self.pos = end;
        Ok(u64::from_le_bytes(chunk.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32> {
        let end = self.pos + 4;
        let chunk = self.bytes.get(self.pos..end).ok_or(LoadError::Truncated)?;
        self.pos = end;
        Ok(u32::from_le_bytes(chunk.try_into().unwrap()))
    }
}
