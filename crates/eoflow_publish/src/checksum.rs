//! Upload planning: part layout, per-part MD5 and the whole-file multihash.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use eoflow_protocol::defaults::MAX_UPLOAD_PARTS;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::api::{CreateUploadRequest, Md5Part};

/// Multihash prefix for sha2-256 with a 32-byte digest.
const SHA256_MULTIHASH_PREFIX: &str = "1220";

/// Base64 MD5 as sent in `Content-MD5`.
pub fn md5_base64(data: &[u8]) -> String {
    STANDARD.encode(md5::compute(data).0)
}

/// Hex multihash (sha2-256) of `data`.
pub fn sha256_multihash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{}{}", SHA256_MULTIHASH_PREFIX, hex::encode(hasher.finalize()))
}

/// Byte range and checksum of one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartChecksum {
    pub part_number: u32,
    pub offset: u64,
    pub len: u64,
    pub md5: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPlan {
    pub file_size: u64,
    pub part_size: u64,
    pub parts: Vec<PartChecksum>,
    pub multihash: String,
}

impl UploadPlan {
    /// Part size for a file: the requested size, shrunk to the file and
    /// grown if the file would need more than the part limit.
    pub fn part_size_for(file_size: u64, requested: u64) -> u64 {
        let mut part_size = requested.min(file_size).max(1);
        if file_size.div_ceil(part_size) > MAX_UPLOAD_PARTS {
            part_size = file_size.div_ceil(MAX_UPLOAD_PARTS);
        }
        part_size
    }

    /// Plan from any reader in one streaming pass.
    pub fn from_reader<R: Read>(mut reader: R, file_size: u64, part_size: u64) -> io::Result<Self> {
        let part_size = part_size.max(1);
        let mut whole = Sha256::new();
        let mut parts = Vec::new();
        let mut offset = 0u64;
        let mut buf = vec![0u8; 1024 * 1024];

        loop {
            let mut ctx = md5::Context::new();
            let mut len = 0u64;
            while len < part_size {
                let want = ((part_size - len) as usize).min(buf.len());
                let read = reader.read(&mut buf[..want])?;
                if read == 0 {
                    break;
                }
                ctx.consume(&buf[..read]);
                whole.update(&buf[..read]);
                len += read as u64;
            }
            if len == 0 && !parts.is_empty() {
                break;
            }
            parts.push(PartChecksum {
                part_number: parts.len() as u32 + 1,
                offset,
                len,
                md5: STANDARD.encode(ctx.compute().0),
            });
            offset += len;
            if len < part_size {
                break;
            }
        }

        if offset != file_size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {file_size} bytes, read {offset}"),
            ));
        }

        Ok(Self {
            file_size,
            part_size,
            parts,
            multihash: format!("{}{}", SHA256_MULTIHASH_PREFIX, hex::encode(whole.finalize())),
        })
    }

    pub fn from_bytes(data: &[u8], part_size: u64) -> Self {
        // Reading from a slice cannot fail and the length is exact.
        match Self::from_reader(data, data.len() as u64, part_size) {
            Ok(plan) => plan,
            Err(_) => unreachable!("in-memory reader is exact"),
        }
    }

    /// Plan a file. `multipart = false` sends the whole file as one part.
    pub fn from_file(path: &Path, requested_part_size: u64, multipart: bool) -> io::Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let part_size = if multipart {
            Self::part_size_for(file_size, requested_part_size)
        } else {
            file_size.max(1)
        };
        Self::from_reader(io::BufReader::new(file), file_size, part_size)
    }

    pub fn part_count(&self) -> u32 {
        self.parts.len() as u32
    }

    pub fn part(&self, part_number: u32) -> Option<&PartChecksum> {
        self.parts.iter().find(|p| p.part_number == part_number)
    }

    pub fn create_request(&self, update_interval_secs: u64) -> CreateUploadRequest {
        CreateUploadRequest {
            number_parts: self.part_count(),
            md5_parts: self
                .parts
                .iter()
                .map(|p| Md5Part {
                    part_number: p.part_number,
                    md5: p.md5.clone(),
                })
                .collect(),
            multihash: self.multihash.clone(),
            update_interval: update_interval_secs,
        }
    }

    /// Read one planned part back from disk.
    pub fn read_part(path: &Path, part: &PartChecksum) -> io::Result<Vec<u8>> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(part.offset))?;
        let mut data = vec![0u8; part.len as usize];
        file.read_exact(&mut data)?;
        Ok(data)
    }

    /// Check part bytes against the planned length and MD5.
    pub fn verify_part(&self, part_number: u32, data: &[u8]) -> bool {
        self.part(part_number)
            .map(|p| p.len == data.len() as u64 && p.md5 == md5_base64(data))
            .unwrap_or(false)
    }

    /// Reassemble parts in order and check every part and the whole-file
    /// multihash.
    pub fn verify_assembly(&self, parts: &[Vec<u8>]) -> Result<Vec<u8>, u32> {
        if parts.len() != self.parts.len() {
            return Err(parts.len().min(self.parts.len()) as u32 + 1);
        }
        let mut assembled = Vec::with_capacity(self.file_size as usize);
        for (planned, data) in self.parts.iter().zip(parts) {
            if !self.verify_part(planned.part_number, data) {
                return Err(planned.part_number);
            }
            assembled.extend_from_slice(data);
        }
        if sha256_multihash(&assembled) != self.multihash {
            return Err(0);
        }
        Ok(assembled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(md5_base64(b"hello world"), "XrY7u+Ae7tCTyyK7j1rNww==");
        assert_eq!(
            sha256_multihash(b"hello world"),
            "1220b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_part_size_limits() {
        let mb = 1024 * 1024;
        assert_eq!(UploadPlan::part_size_for(10 * mb, 250 * mb), 10 * mb);
        assert_eq!(UploadPlan::part_size_for(600 * mb, 250 * mb), 250 * mb);
        // 100 parts max: a 1000-byte file with 5-byte parts needs 10-byte parts
        assert_eq!(UploadPlan::part_size_for(1000, 5), 10);
        assert_eq!(UploadPlan::part_size_for(0, 5), 1);
    }

    #[test]
    fn test_parts_cover_file() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let plan = UploadPlan::from_bytes(&data, 3_000);

        assert_eq!(plan.part_count(), 4);
        assert_eq!(plan.parts[3].len, 1_000);
        assert_eq!(plan.parts[3].offset, 9_000);
        assert_eq!(plan.multihash, sha256_multihash(&data));

        let chunks: Vec<Vec<u8>> = plan
            .parts
            .iter()
            .map(|p| data[p.offset as usize..(p.offset + p.len) as usize].to_vec())
            .collect();
        assert_eq!(plan.verify_assembly(&chunks).unwrap(), data);
    }

    #[test]
    fn test_corrupted_chunk_is_detected() {
        let data: Vec<u8> = (0..4_096u32).map(|i| (i * 7 % 256) as u8).collect();
        let plan = UploadPlan::from_bytes(&data, 1_024);
        let mut chunks: Vec<Vec<u8>> = data.chunks(1_024).map(|c| c.to_vec()).collect();

        for target in 0..chunks.len() {
            let original = chunks[target][10];
            chunks[target][10] ^= 0xff;
            assert_eq!(plan.verify_assembly(&chunks), Err(target as u32 + 1));
            chunks[target][10] = original;
        }
        assert!(plan.verify_assembly(&chunks).is_ok());

        chunks.pop();
        assert!(plan.verify_assembly(&chunks).is_err());
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let data = vec![1u8; 2_048];
        let plan = UploadPlan::from_bytes(&data, 1_024);
        assert_eq!(plan.part_count(), 2);
        assert!(plan.parts.iter().all(|p| p.len == 1_024));
    }

    #[test]
    fn test_empty_file_is_one_part() {
        let plan = UploadPlan::from_bytes(&[], 1_024);
        assert_eq!(plan.part_count(), 1);
        assert_eq!(plan.parts[0].len, 0);
    }

    #[test]
    fn test_file_plan_and_read_back() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("artifact.tif");
        let data: Vec<u8> = (0..5_000u32).map(|i| (i % 13) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let plan = UploadPlan::from_file(&path, 2_000, true).unwrap();
        assert_eq!(plan.part_count(), 3);
        let second = UploadPlan::read_part(&path, &plan.parts[1]).unwrap();
        assert!(plan.verify_part(2, &second));
        assert!(!plan.verify_part(3, &second));

        let single = UploadPlan::from_file(&path, 2_000, false).unwrap();
        assert_eq!(single.part_count(), 1);
        assert_eq!(single.multihash, plan.multihash);

        let request = plan.create_request(30);
        assert_eq!(request.number_parts, 3);
        assert_eq!(request.md5_parts[2].part_number, 3);
        assert_eq!(request.update_interval, 30);
    }
}
