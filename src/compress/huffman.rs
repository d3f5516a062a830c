//! Static Huffman coding over bytes
//!
//! Compression makes two passes over the input: one to count symbol
//! frequencies (and the CRC), one to emit codes. The frequency table is
//! stored after the header so the decoder can rebuild the identical tree.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::crc32::Crc32;
use super::{CompressedHeader, CompressionAlgorithm, CHUNK_SIZE, HEADER_SIZE};
use crate::binio::{read_u64, read_u8, truncated, write_u64};
use crate::error::{StowawayError, StowawayResult};

/// Distinct byte values
pub const MAX_SYMBOLS: usize = 256;

/// One table entry: u8 symbol followed by u64 count
const TABLE_ENTRY_LEN: u32 = 9;

type Frequencies = [u64; MAX_SYMBOLS];

#[derive(Debug, Clone)]
struct Node {
    freq: u64,
    /// `None` on internal nodes and on padding leaves that carry no symbol
    symbol: Option<u8>,
    children: Option<(usize, usize)>,
}

impl Node {
    fn leaf(freq: u64, symbol: Option<u8>) -> Self {
        Self {
            freq,
            symbol,
            children: None,
        }
    }
}

/// Code tree built from a frequency table
///
/// Construction is deterministic: nodes are ordered by (frequency, creation
/// order), leaves are created in ascending symbol order, and the first node
/// taken from the queue becomes the left (`0`) child.
#[derive(Debug, Clone)]
pub struct HuffmanTree {
    nodes: Vec<Node>,
    root: usize,
}

impl HuffmanTree {
    pub fn from_frequencies(freq: &Frequencies) -> Self {
        let mut nodes = Vec::new();
        // The arena index doubles as the creation sequence for tie-breaks
        let mut heap = BinaryHeap::new();
        for (symbol, &count) in freq.iter().enumerate() {
            if count > 0 {
                heap.push(Reverse((count, nodes.len())));
                nodes.push(Node::leaf(count, Some(symbol as u8)));
            }
        }

        match nodes.len() {
            0 => {
                nodes.push(Node::leaf(0, None));
                return Self { nodes, root: 0 };
            }
            1 => {
                // Give the lone symbol a one-bit code
                let freq = nodes[0].freq;
                nodes.push(Node::leaf(0, None));
                nodes.push(Node {
                    freq,
                    symbol: None,
                    children: Some((0, 1)),
                });
                return Self { nodes, root: 2 };
            }
            _ => {}
        }

        while heap.len() > 1 {
            if let (Some(Reverse((lf, left))), Some(Reverse((rf, right)))) = (heap.pop(), heap.pop()) {
                let freq = lf + rf;
                heap.push(Reverse((freq, nodes.len())));
                nodes.push(Node {
                    freq,
                    symbol: None,
                    children: Some((left, right)),
                });
            }
        }
        let root = heap.pop().map(|Reverse((_, idx))| idx).unwrap_or(0);
        Self { nodes, root }
    }

    /// Bit sequence per symbol; absent symbols get an empty code
    pub fn codes(&self) -> Vec<Vec<bool>> {
        let mut codes = vec![Vec::new(); MAX_SYMBOLS];
        let mut stack = vec![(self.root, Vec::new())];
        while let Some((idx, prefix)) = stack.pop() {
            let node = &self.nodes[idx];
            match node.children {
                Some((left, right)) => {
                    let mut left_code = prefix.clone();
                    left_code.push(false);
                    let mut right_code = prefix;
                    right_code.push(true);
                    stack.push((right, right_code));
                    stack.push((left, left_code));
                }
                None => {
                    if let Some(symbol) = node.symbol {
                        codes[symbol as usize] = if prefix.is_empty() {
                            vec![false]
                        } else {
                            prefix
                        };
                    }
                }
            }
        }
        codes
    }

    /// Total weight of the tree
    pub fn weight(&self) -> u64 {
        self.nodes[self.root].freq
    }

    fn step(&self, idx: usize, bit: bool) -> usize {
        match self.nodes[idx].children {
            Some((left, right)) => {
                if bit {
                    right
                } else {
                    left
                }
            }
            None => idx,
        }
    }
}

/// Result of the counting pass
struct Scan {
    freq: Frequencies,
    len: u64,
    crc: u32,
}

impl Scan {
    fn distinct(&self) -> u32 {
        self.freq.iter().filter(|&&c| c > 0).count() as u32
    }
}

fn scan<R: Read>(mut input: R) -> io::Result<Scan> {
    let mut freq = [0u64; MAX_SYMBOLS];
    let mut crc = Crc32::new();
    let mut len = 0u64;
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        for &byte in &buf[..n] {
            freq[byte as usize] += 1;
        }
        crc.update(&buf[..n]);
        len += n as u64;
    }
    Ok(Scan {
        freq,
        len,
        crc: crc.finalize(),
    })
}

/// Packs bits MSB-first and writes whole chunks
struct BitWriter<W: Write> {
    out: W,
    buf: Vec<u8>,
    current: u8,
    filled: u8,
}

impl<W: Write> BitWriter<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            buf: Vec::with_capacity(CHUNK_SIZE),
            current: 0,
            filled: 0,
        }
    }

    fn push(&mut self, bit: bool) -> io::Result<()> {
        self.current = (self.current << 1) | u8::from(bit);
        self.filled += 1;
        if self.filled == 8 {
            self.buf.push(self.current);
            self.current = 0;
            self.filled = 0;
            if self.buf.len() >= CHUNK_SIZE {
                self.out.write_all(&self.buf)?;
                self.buf.clear();
            }
        }
        Ok(())
    }

    /// Flush everything and return the number of padding bits in the last byte
    fn finish(mut self) -> io::Result<u8> {
        let mut padding = 0;
        if self.filled > 0 {
            padding = 8 - self.filled;
            self.buf.push(self.current << padding);
        }
        self.out.write_all(&self.buf)?;
        Ok(padding)
    }
}

fn write_table<W: Write>(out: &mut W, freq: &Frequencies) -> io::Result<()> {
    for (symbol, &count) in freq.iter().enumerate() {
        if count > 0 {
            out.write_all(&[symbol as u8])?;
            write_u64(out, count)?;
        }
    }
    Ok(())
}

fn read_table<R: Read>(input: &mut R, table_size: u32, original_size: u64) -> StowawayResult<Frequencies> {
    if table_size % TABLE_ENTRY_LEN != 0 || table_size > TABLE_ENTRY_LEN * MAX_SYMBOLS as u32 {
        return Err(StowawayError::Format(format!(
            "invalid frequency table size {}",
            table_size
        )));
    }

    let mut freq = [0u64; MAX_SYMBOLS];
    let mut total = 0u64;
    for _ in 0..table_size / TABLE_ENTRY_LEN {
        let symbol = read_u8(input, "frequency table")?;
        let count = read_u64(input, "frequency table")?;
        if count == 0 || freq[symbol as usize] != 0 {
            return Err(StowawayError::Format(format!(
                "malformed frequency table entry for symbol {:#04x}",
                symbol
            )));
        }
        freq[symbol as usize] = count;
        total = total.checked_add(count).ok_or_else(|| {
            StowawayError::Format("frequency table overflows".to_string())
        })?;
    }

    if total != original_size {
        return Err(StowawayError::Format(format!(
            "frequency table covers {} bytes but header says {}",
            total, original_size
        )));
    }
    Ok(freq)
}

/// Second pass: header, table and bitstream. The header is rewritten once the
/// padding is known.
fn encode<R: Read, W: Write + Seek>(
    mut input: R,
    scan: &Scan,
    out: &mut W,
) -> StowawayResult<CompressedHeader> {
    let tree = HuffmanTree::from_frequencies(&scan.freq);
    let codes = tree.codes();

    let mut header = CompressedHeader::new(
        CompressionAlgorithm::Huffman,
        scan.distinct() * TABLE_ENTRY_LEN,
        scan.len,
    );
    header.crc32 = scan.crc;
    header.write_to(out)?;
    write_table(out, &scan.freq)?;

    let mut bits = BitWriter::new(&mut *out);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut consumed = 0u64;
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        for &byte in &buf[..n] {
            let code = &codes[byte as usize];
            if code.is_empty() {
                return Err(source_changed());
            }
            for &bit in code {
                bits.push(bit)?;
            }
        }
        consumed += n as u64;
    }
    if consumed != scan.len {
        return Err(source_changed());
    }
    header.valid_bits = bits.finish()?;

    out.seek(SeekFrom::Start(0))?;
    header.write_to(out)?;
    out.seek(SeekFrom::End(0))?;
    Ok(header)
}

fn source_changed() -> StowawayError {
    StowawayError::Io("input changed while it was being compressed".to_string())
}

/// Decode a whole artifact of `total_len` bytes from `input` into `out`,
/// verifying length and CRC
fn decode<R: Read, W: Write>(input: &mut R, total_len: u64, out: &mut W) -> StowawayResult<CompressedHeader> {
    let header = CompressedHeader::read_from(input, CompressionAlgorithm::Huffman)?;
    let freq = read_table(input, header.freq_table_size, header.original_size)?;
    let payload_len = total_len
        .checked_sub(u64::from(HEADER_SIZE) + u64::from(header.freq_table_size))
        .ok_or_else(|| StowawayError::Format("truncated artifact while reading frequency table".to_string()))?;

    let tree = HuffmanTree::from_frequencies(&freq);
    let mut crc = Crc32::new();
    let mut produced = 0u64;
    let mut pending = Vec::with_capacity(CHUNK_SIZE);
    let mut node = tree.root;
    let mut remaining = payload_len;
    let mut buf = vec![0u8; CHUNK_SIZE];

    'payload: while remaining > 0 && produced < header.original_size {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        input
            .read_exact(&mut buf[..want])
            .map_err(|e| truncated(e, "compressed payload"))?;
        remaining -= want as u64;

        for (i, &byte) in buf[..want].iter().enumerate() {
            let last = remaining == 0 && i + 1 == want;
            let usable = if last { 8 - header.valid_bits } else { 8 };
            for shift in 0..usable {
                node = tree.step(node, byte & (0x80 >> shift) != 0);
                let current = &tree.nodes[node];
                if current.children.is_some() {
                    continue;
                }
                // The padding leaf is only reachable through a damaged bitstream
                let Some(symbol) = current.symbol else {
                    break 'payload;
                };
                pending.push(symbol);
                produced += 1;
                node = tree.root;
                if pending.len() >= CHUNK_SIZE {
                    crc.update(&pending);
                    out.write_all(&pending)?;
                    pending.clear();
                }
                if produced == header.original_size {
                    break 'payload;
                }
            }
        }
    }
    crc.update(&pending);
    out.write_all(&pending)?;

    let actual = crc.finalize();
    if produced != header.original_size {
        return Err(StowawayError::ChecksumMismatch {
            context: format!(
                "decompressed data (decoding stopped after {} of {} bytes)",
                produced, header.original_size
            ),
            expected: header.crc32,
            actual,
        });
    }
    if actual != header.crc32 {
        return Err(StowawayError::ChecksumMismatch {
            context: "decompressed data".to_string(),
            expected: header.crc32,
            actual,
        });
    }
    Ok(header)
}

fn open_input(path: &Path) -> StowawayResult<File> {
    File::open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            StowawayError::file_not_found(path.display().to_string())
        } else {
            e.into()
        }
    })
}

pub(super) fn compress_file(src: &Path, dest: &Path) -> StowawayResult<CompressedHeader> {
    let scan = scan(BufReader::new(open_input(src)?))?;
    match write_compressed(src, dest, &scan) {
        Ok(header) => {
            info!(
                source = %src.display(),
                artifact = %dest.display(),
                original = header.original_size,
                "Compressed file"
            );
            Ok(header)
        }
        Err(e) => {
            let _ = fs::remove_file(dest);
            Err(e)
        }
    }
}

fn write_compressed(src: &Path, dest: &Path, scan: &Scan) -> StowawayResult<CompressedHeader> {
    let mut out = BufWriter::new(File::create(dest)?);
    let header = encode(BufReader::new(open_input(src)?), scan, &mut out)?;
    out.flush()?;
    Ok(header)
}

/// Sibling path the decoder writes to before the CRC has been checked
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

pub(super) fn decompress_file(src: &Path, dest: &Path) -> StowawayResult<CompressedHeader> {
    let input = open_input(src)?;
    let total_len = input.metadata()?.len();
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let partial = partial_path(dest);
    let result = (|| -> StowawayResult<CompressedHeader> {
        let mut reader = BufReader::new(input);
        let mut out = BufWriter::new(File::create(&partial)?);
        let header = decode(&mut reader, total_len, &mut out)?;
        out.flush()?;
        Ok(header)
    })();

    match result {
        Ok(header) => {
            fs::rename(&partial, dest)?;
            debug!(
                artifact = %src.display(),
                restored = %dest.display(),
                bytes = header.original_size,
                "Decompressed file"
            );
            Ok(header)
        }
        Err(e) => {
            let _ = fs::remove_file(&partial);
            Err(e)
        }
    }
}

pub(super) fn compress_bytes(data: &[u8]) -> StowawayResult<Vec<u8>> {
    let scan = scan(data)?;
    let mut out = Cursor::new(Vec::new());
    encode(data, &scan, &mut out)?;
    Ok(out.into_inner())
}

pub(super) fn decompress_bytes(data: &[u8]) -> StowawayResult<Vec<u8>> {
    let mut out = Vec::new();
    decode(&mut &data[..], data.len() as u64, &mut out)?;
    Ok(out)
}
