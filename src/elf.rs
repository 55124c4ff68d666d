//! ELF binary loading for gadget search.
//!
//! Memory-maps the binary, enumerates its executable `PT_LOAD`
//! segments, and derives a content digest used as the gadget-cache
//! key. The scan pipeline only ever borrows segment bytes.

use std::fmt::Write as _;
use std::path::Path;

use memmap2::Mmap;
use sha2::{Digest, Sha256};

use crate::arch::Arch;
use crate::error::{Error, Result};

/// An executable region of the binary.
#[derive(Debug, Clone)]
pub struct Segment {
    /// File virtual address (link-time, before any load bias).
    pub vaddr: u64,
    offset: usize,
    size: usize,
}

enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Backing {
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::Mapped(m) => m,
            Backing::Owned(v) => v,
        }
    }
}

/// A loaded ELF binary: architecture, executable segments, PIE flag,
/// and a content-addressable identity.
pub struct BinaryImage {
    backing: Backing,
    arch: Arch,
    pie: bool,
    /// Nominal base: lowest PT_LOAD vaddr in the file.
    base: u64,
    /// Runtime base. Defaults to `base`; callers rebase PIE binaries
    /// with [`BinaryImage::set_load_addr`].
    load_addr: u64,
    identity: String,
    segments: Vec<Segment>,
}

impl BinaryImage {
    /// Load an ELF binary from disk via memory mapping.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Binary(format!("open '{}': {}", path.display(), e)))?;
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| Error::Binary(format!("mmap '{}': {}", path.display(), e)))?;
        Self::parse(Backing::Mapped(mmap))
    }

    /// Parse an ELF binary from an in-memory buffer.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::parse(Backing::Owned(data))
    }

    fn parse(backing: Backing) -> Result<Self> {
        let data = backing.bytes();
        let elf = goblin::elf::Elf::parse(data)
            .map_err(|e| Error::Binary(format!("parse ELF: {}", e)))?;

        let arch = match elf.header.e_machine {
            goblin::elf::header::EM_386 => Arch::I386,
            goblin::elf::header::EM_X86_64 => Arch::Amd64,
            goblin::elf::header::EM_ARM => Arch::Arm,
            m => {
                return Err(Error::UnsupportedArchitecture(format!("e_machine {}", m)));
            }
        };
        let pie = elf.header.e_type == goblin::elf::header::ET_DYN;

        let mut base = u64::MAX;
        let mut segments = Vec::new();
        for ph in &elf.program_headers {
            if ph.p_type != goblin::elf::program_header::PT_LOAD {
                continue;
            }
            base = base.min(ph.p_vaddr);
            if ph.p_flags & goblin::elf::program_header::PF_X == 0 {
                continue;
            }
            let offset = ph.p_offset as usize;
            let size = ph.p_filesz as usize;
            if offset.checked_add(size).map_or(true, |end| end > data.len()) {
                continue;
            }
            segments.push(Segment { vaddr: ph.p_vaddr, offset, size });
        }
        if base == u64::MAX {
            base = 0;
        }

        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut identity = String::with_capacity(64);
        for b in digest {
            let _ = write!(identity, "{:02x}", b);
        }

        Ok(BinaryImage {
            backing,
            arch,
            pie,
            base,
            load_addr: base,
            identity,
            segments,
        })
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn is_pie(&self) -> bool {
        self.pie
    }

    /// Hex sha256 of the file contents; the cache key.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Total size of the binary in bytes.
    pub fn file_size(&self) -> usize {
        self.backing.bytes().len()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment_bytes(&self, seg: &Segment) -> &[u8] {
        &self.backing.bytes()[seg.offset..seg.offset + seg.size]
    }

    /// Rebase the image to its runtime load address.
    pub fn set_load_addr(&mut self, addr: u64) {
        self.load_addr = addr;
    }

    pub fn load_addr(&self) -> u64 {
        self.load_addr
    }

    /// Difference between the runtime and file base addresses.
    /// Zero unless a PIE binary has been rebased.
    pub fn load_bias(&self) -> i64 {
        self.load_addr.wrapping_sub(self.base) as i64
    }

    /// Runtime address of a file virtual address.
    pub fn runtime_addr(&self, file_vaddr: u64) -> u64 {
        file_vaddr.wrapping_add(self.load_bias() as u64)
    }

    /// File virtual address of a runtime address. Inverse of
    /// [`BinaryImage::runtime_addr`]; cache entries store this form.
    pub fn file_addr(&self, runtime_vaddr: u64) -> u64 {
        runtime_vaddr.wrapping_sub(self.load_bias() as u64)
    }
}
