use std::io::Cursor;

use super::{IVF_FRAME_HEADER_SIZE, IVF_HEADER_SIZE, IvfHeader, IvfWriter};

#[tokio::test]
async fn test_header_and_frames() -> anyhow::Result<()> {
    let mut writer = IvfWriter::new(Cursor::new(Vec::new()), &IvfHeader::vp8(640, 480)).await?;
    writer.write_frame(0, b"key").await?;
    writer.write_frame(3000, b"delta").await?;
    writer.finish().await?;
    assert_eq!(writer.frame_count(), 2);

    let buf = writer.into_inner().into_inner();
    assert_eq!(
        buf.len(),
        IVF_HEADER_SIZE as usize + 2 * IVF_FRAME_HEADER_SIZE + 3 + 5
    );
    assert_eq!(&buf[0..4], b"DKIF");
    assert_eq!(&buf[8..12], b"VP80");
    assert_eq!(u16::from_le_bytes([buf[12], buf[13]]), 640);
    assert_eq!(u16::from_le_bytes([buf[14], buf[15]]), 480);
    assert_eq!(u32::from_le_bytes(buf[16..20].try_into()?), 90_000);
    assert_eq!(u32::from_le_bytes(buf[24..28].try_into()?), 2);

    let first = IVF_HEADER_SIZE as usize;
    assert_eq!(u32::from_le_bytes(buf[first..first + 4].try_into()?), 3);
    assert_eq!(u64::from_le_bytes(buf[first + 4..first + 12].try_into()?), 0);
    assert_eq!(&buf[first + 12..first + 15], b"key");

    let second = first + IVF_FRAME_HEADER_SIZE + 3;
    assert_eq!(u64::from_le_bytes(buf[second + 4..second + 12].try_into()?), 3000);
    assert_eq!(&buf[second + 12..], b"delta");
    Ok(())
}

#[tokio::test]
async fn test_finish_is_idempotent() -> anyhow::Result<()> {
    let mut writer = IvfWriter::new(Cursor::new(Vec::new()), &IvfHeader::vp8(0, 0)).await?;
    writer.write_frame(0, b"a").await?;
    writer.finish().await?;
    writer.finish().await?;
    let buf = writer.into_inner().into_inner();
    assert_eq!(buf.len(), IVF_HEADER_SIZE as usize + IVF_FRAME_HEADER_SIZE + 1);
    Ok(())
}
