/// Media metadata probing
///
/// Reads the movie header (`moov/mvhd`) of ISO base media files (MP4, MOV,
/// M4V) to recover the presentation duration.

struct BoxHeader {
    kind: [u8; 4],
    /// Offset of the payload
    body: usize,
    /// Offset one past the end of the box
    end: usize,
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u64(data: &[u8], at: usize) -> Option<u64> {
    let b = data.get(at..at + 8)?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(b);
    Some(u64::from_be_bytes(bytes))
}

fn read_header(data: &[u8], at: usize, limit: usize) -> Option<BoxHeader> {
    let size = read_u32(data, at)? as u64;
    let kind: [u8; 4] = data.get(at + 4..at + 8)?.try_into().ok()?;

    let (body, size) = match size {
        0 => (at + 8, (limit - at) as u64),
        1 => (at + 16, read_u64(data, at + 8)?),
        n => (at + 8, n),
    };

    let end = at.checked_add(usize::try_from(size).ok()?)?;
    if end > limit || end < body {
        return None;
    }

    Some(BoxHeader { kind, body, end })
}

/// First child box of the given kind within `[start, limit)`
fn find_box(data: &[u8], start: usize, limit: usize, kind: &[u8; 4]) -> Option<BoxHeader> {
    let mut at = start;
    while at + 8 <= limit {
        let header = read_header(data, at, limit)?;
        if &header.kind == kind {
            return Some(header);
        }
        at = header.end;
    }
    None
}

/// Duration in seconds, or `None` if the data is not a readable ISO media file
pub fn mp4_duration(data: &[u8]) -> Option<f64> {
    let moov = find_box(data, 0, data.len(), b"moov")?;
    let mvhd = find_box(data, moov.body, moov.end, b"mvhd")?;

    let version = *data.get(mvhd.body)?;
    let (timescale, duration) = match version {
        0 => (read_u32(data, mvhd.body + 12)?, read_u32(data, mvhd.body + 16)? as u64),
        1 => (read_u32(data, mvhd.body + 20)?, read_u64(data, mvhd.body + 24)?),
        _ => return None,
    };

    if timescale == 0 || duration == u64::MAX || (version == 0 && duration == u32::MAX as u64) {
        return None;
    }

    Some(duration as f64 / timescale as f64)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn boxed(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(payload);
        out
    }

    fn mvhd_v0(timescale: u32, duration: u32) -> Vec<u8> {
        let mut payload = vec![0u8; 4]; // version + flags
        payload.extend_from_slice(&0u32.to_be_bytes()); // creation
        payload.extend_from_slice(&0u32.to_be_bytes()); // modification
        payload.extend_from_slice(&timescale.to_be_bytes());
        payload.extend_from_slice(&duration.to_be_bytes());
        payload.extend_from_slice(&[0u8; 80]);
        boxed(b"mvhd", &payload)
    }

    /// Smallest file the probe accepts
    pub(crate) fn sample_mp4(timescale: u32, duration: u32) -> Vec<u8> {
        let mut file = boxed(b"ftyp", b"isom\0\0\x02\0isomiso2");
        file.extend(boxed(b"free", &[0u8; 16]));
        file.extend(boxed(b"moov", &mvhd_v0(timescale, duration)));
        file
    }

    #[test]
    fn test_reads_version_zero_header() {
        assert_eq!(mp4_duration(&sample_mp4(1000, 12_500)), Some(12.5));
    }

    #[test]
    fn test_reads_version_one_header() {
        let mut payload = vec![1u8, 0, 0, 0];
        payload.extend_from_slice(&0u64.to_be_bytes());
        payload.extend_from_slice(&0u64.to_be_bytes());
        payload.extend_from_slice(&600u32.to_be_bytes());
        payload.extend_from_slice(&(600u64 * 90).to_be_bytes());
        let file = boxed(b"moov", &boxed(b"mvhd", &payload));

        assert_eq!(mp4_duration(&file), Some(90.0));
    }

    #[test]
    fn test_non_media_and_truncated_input() {
        assert_eq!(mp4_duration(b"\x89PNG\r\n\x1a\n not a movie"), None);
        assert_eq!(mp4_duration(&[]), None);

        let file = sample_mp4(1000, 5000);
        assert_eq!(mp4_duration(&file[..file.len() - 40]), None);
    }

    #[test]
    fn test_zero_timescale() {
        assert_eq!(mp4_duration(&sample_mp4(0, 5000)), None);
    }
}
