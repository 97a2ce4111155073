//! Locating the three trailer records — EOCDR, and optionally the Zip64
//! EOCDL/EOCDR pair — from a buffer holding the tail of an archive.
//!
//! The EOCDR's comment is free-form and can itself contain bytes that look
//! like a signature, so the scan does not stop at the first match: it
//! backs up from the end of the buffer and accepts a candidate only if its
//! comment length exactly accounts for the remaining bytes in the buffer.

use crate::error::{Result, ZipError};
use crate::records::{
    EndOfCentralDirectory, Zip64EndOfCentralDirectory, Zip64EndOfCentralDirectoryLocator,
    EOCDR_FIXED_SIZE, SIG_EOCDR, SIG_ZIP64_EOCDL, ZIP64_EOCDL_SIZE, ZIP64_EOCDR_FIXED_SIZE,
};

/// The largest EOCDR comment APPNOTE allows, and so the furthest back from
/// the end of the file the record's signature can start.
const MAX_COMMENT_LEN: usize = 0xFFFF;

/// Outcome of scanning a tail buffer for the trailer records.
#[derive(Debug)]
pub enum LocateResult {
    /// Both trailer records (or just the classic one, for a non-Zip64
    /// archive) were fully resolved from the supplied buffer.
    Found {
        eocdr: EndOfCentralDirectory,
        eocdr_offset: u64,
        zip64_eocdr: Option<Zip64EndOfCentralDirectory>,
    },
    /// The classic EOCDR was found and points at a Zip64 EOCDR that falls
    /// outside the supplied buffer. The caller must read
    /// `zip64_eocdr_len` bytes at `zip64_eocdr_offset` and parse them with
    /// [`Zip64EndOfCentralDirectory::parse`].
    NeedsTargetedRead {
        eocdr: EndOfCentralDirectory,
        eocdr_offset: u64,
        zip64_eocdr_offset: u64,
        zip64_eocdr_len: usize,
    },
}

/// Scans `buffer` — the tail of an archive, ending at the file's last byte
/// — for the EOCDR and, if present, the Zip64 EOCDL/EOCDR pair.
///
/// `buffer_start` is the absolute file offset of `buffer[0]`. Pass `0` only
/// when `buffer` holds the entire file; otherwise the caller must have
/// seeded the buffer far enough back to cover the maximum comment length
/// (`buffer.len() >= min(file_len, 22 + 0xFFFF)`).
pub fn locate(buffer: &[u8], buffer_start: u64) -> Result<LocateResult> {
    let len = buffer.len();
    if len < EOCDR_FIXED_SIZE {
        return Err(ZipError::format("buffer too small to contain an end of central directory record"));
    }

    let earliest = len.saturating_sub(EOCDR_FIXED_SIZE + MAX_COMMENT_LEN);
    let mut found_at = None;
    let mut pos = len - EOCDR_FIXED_SIZE;
    loop {
        let signature = u32::from_le_bytes(buffer[pos..pos + 4].try_into().unwrap());
        if signature == SIG_EOCDR {
            let comment_len = u16::from_le_bytes([buffer[pos + 20], buffer[pos + 21]]) as usize;
            if pos + EOCDR_FIXED_SIZE + comment_len == len {
                found_at = Some(pos);
                break;
            }
        }
        if pos == earliest {
            break;
        }
        pos -= 1;
    }

    let eocdr_pos = found_at.ok_or_else(|| {
        ZipError::format("end of central directory record not found within the last 64 KiB + 22 bytes")
    })?;
    let eocdr = EndOfCentralDirectory::parse(&buffer[eocdr_pos..])?;
    let eocdr_offset = buffer_start + eocdr_pos as u64;

    let locator_pos = eocdr_pos as i64 - ZIP64_EOCDL_SIZE as i64;
    if locator_pos < 0 {
        if buffer_start > 0 {
            return Err(ZipError::format(
                "buffer does not extend far enough back to check for a zip64 locator",
            ));
        }
        return Ok(LocateResult::Found { eocdr, eocdr_offset, zip64_eocdr: None });
    }
    let locator_pos = locator_pos as usize;

    let locator_signature = u32::from_le_bytes(buffer[locator_pos..locator_pos + 4].try_into().unwrap());
    if locator_signature != SIG_ZIP64_EOCDL {
        return Ok(LocateResult::Found { eocdr, eocdr_offset, zip64_eocdr: None });
    }

    let locator = Zip64EndOfCentralDirectoryLocator::parse(&buffer[locator_pos..])?;
    let zip64_offset = locator.zip64_eocdr_offset;

    if zip64_offset >= buffer_start {
        let relative = (zip64_offset - buffer_start) as usize;
        if relative + ZIP64_EOCDR_FIXED_SIZE <= len {
            let zip64_eocdr = Zip64EndOfCentralDirectory::parse(&buffer[relative..])?;
            return Ok(LocateResult::Found { eocdr, eocdr_offset, zip64_eocdr: Some(zip64_eocdr) });
        }
    }

    Ok(LocateResult::NeedsTargetedRead {
        eocdr,
        eocdr_offset,
        zip64_eocdr_offset: zip64_offset,
        zip64_eocdr_len: ZIP64_EOCDR_FIXED_SIZE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::BinaryWrite;

    fn build_plain_eocdr(comment: &[u8]) -> Vec<u8> {
        let eocdr = EndOfCentralDirectory {
            disk_number: 0,
            cd_start_disk: 0,
            entries_this_disk: 3,
            entries_total: 3,
            cd_size: 200,
            cd_offset: 1000,
            comment: comment.to_vec(),
        };
        let mut buf = Vec::new();
        eocdr.write(&mut buf);
        buf
    }

    #[test]
    fn locates_a_plain_eocdr_at_the_end_of_the_buffer() {
        let buf = build_plain_eocdr(b"");
        match locate(&buf, 0).unwrap() {
            LocateResult::Found { eocdr, eocdr_offset, zip64_eocdr } => {
                assert_eq!(eocdr_offset, 0);
                assert_eq!(eocdr.entries_total, 3);
                assert!(zip64_eocdr.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn ignores_a_spurious_signature_inside_the_comment() {
        let mut comment = Vec::new();
        comment.extend_from_slice(&SIG_EOCDR.to_le_bytes());
        comment.extend_from_slice(b"decoy");
        let buf = build_plain_eocdr(&comment);
        match locate(&buf, 0).unwrap() {
            LocateResult::Found { eocdr, .. } => assert_eq!(eocdr.comment, comment),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn finds_zip64_eocdr_when_it_fits_in_the_buffer() {
        let mut buf = Vec::new();
        let zip64 = Zip64EndOfCentralDirectory {
            version_made_by: 45,
            version_needed: 45,
            disk_number: 0,
            cd_start_disk: 0,
            entries_this_disk: 70_000,
            entries_total: 70_000,
            cd_size: 5_000_000,
            cd_offset: 100,
            extensible_data: Vec::new(),
        };
        let zip64_offset = 0u64;
        zip64.write(&mut buf);

        let locator = Zip64EndOfCentralDirectoryLocator {
            disk_with_zip64_eocdr: 0,
            zip64_eocdr_offset: zip64_offset,
            total_disks: 1,
        };
        locator.write(&mut buf);

        let eocdr = EndOfCentralDirectory {
            disk_number: 0,
            cd_start_disk: 0,
            entries_this_disk: u16::MAX,
            entries_total: u16::MAX,
            cd_size: u32::MAX,
            cd_offset: u32::MAX,
            comment: Vec::new(),
        };
        eocdr.write(&mut buf);

        match locate(&buf, 0).unwrap() {
            LocateResult::Found { zip64_eocdr: Some(z), .. } => {
                assert_eq!(z.entries_total, 70_000);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn requests_a_targeted_read_when_zip64_eocdr_is_out_of_buffer() {
        // Simulate a buffer that only covers the tail of a much larger file:
        // the locator points far before buffer_start.
        let mut buf = Vec::new();
        let locator = Zip64EndOfCentralDirectoryLocator {
            disk_with_zip64_eocdr: 0,
            zip64_eocdr_offset: 10,
            total_disks: 1,
        };
        locator.write(&mut buf);
        let eocdr = EndOfCentralDirectory {
            disk_number: 0,
            cd_start_disk: 0,
            entries_this_disk: u16::MAX,
            entries_total: u16::MAX,
            cd_size: u32::MAX,
            cd_offset: u32::MAX,
            comment: Vec::new(),
        };
        eocdr.write(&mut buf);

        match locate(&buf, 1_000_000).unwrap() {
            LocateResult::NeedsTargetedRead { zip64_eocdr_offset, zip64_eocdr_len, .. } => {
                assert_eq!(zip64_eocdr_offset, 10);
                assert_eq!(zip64_eocdr_len, ZIP64_EOCDR_FIXED_SIZE);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn missing_eocdr_is_a_format_error() {
        let buf = vec![0u8; 100];
        assert!(locate(&buf, 0).is_err());
    }
}
