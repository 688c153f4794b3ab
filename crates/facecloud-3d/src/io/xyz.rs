use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

use crate::pointcloud::PointCloud;

/// Error types for the XYZ module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum XyzError {
    /// Failed to read or write the XYZ file
    #[error("Failed to access XYZ file")]
    Io(#[from] std::io::Error),

    /// A line does not contain exactly three numeric values
    #[error("Malformed XYZ line {line}: {content:?}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// The offending line.
        content: String,
    },

    /// The file does not contain any point
    #[error("XYZ file does not contain any point")]
    EmptyCloud,
}

fn parse_line(line: &str) -> Option<[f64; 3]> {
    let mut tokens = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty());

    let mut point = [0.0; 3];
    for coord in point.iter_mut() {
        *coord = tokens
            .next()?
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())?;
    }

    if tokens.next().is_some() {
        return None;
    }

    Some(point)
}

/// Parse a point cloud from a reader with one point per line.
///
/// Values can be separated by whitespace, commas or both. Blank lines are skipped.
///
/// # Arguments
///
/// * `reader` - The source of the text.
///
/// # Returns
///
/// The parsed point cloud with the points in file order.
///
/// Example:
///
/// ```
/// use facecloud_3d::io::xyz::parse_xyz;
///
/// let text = "0 0 0\n1.5, 2.0, -3\n";
/// let cloud = parse_xyz(text.as_bytes()).unwrap();
/// assert_eq!(cloud.points(), &[[0.0, 0.0, 0.0], [1.5, 2.0, -3.0]]);
/// ```
pub fn parse_xyz<R: BufRead>(mut reader: R) -> Result<PointCloud, XyzError> {
    let mut points = Vec::new();
    let mut buf = Vec::new();
    let mut line = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line += 1;

        let malformed = |buf: &[u8]| XyzError::Parse {
            line,
            content: String::from_utf8_lossy(buf).trim().to_string(),
        };
        let text = std::str::from_utf8(&buf).map_err(|_| malformed(&buf))?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }

        let point = parse_line(trimmed).ok_or_else(|| malformed(&buf))?;
        points.push(point);
    }

    if points.is_empty() {
        return Err(XyzError::EmptyCloud);
    }

    Ok(PointCloud::new(points))
}

/// Read a point cloud from an XYZ text file.
pub fn read_xyz(path: impl AsRef<Path>) -> Result<PointCloud, XyzError> {
    let file = std::fs::File::open(path)?;
    parse_xyz(std::io::BufReader::new(file))
}

/// Write a point cloud as XYZ text, one `x y z` line per point.
///
/// Values are written with the shortest representation that reads back to the same `f64`.
pub fn format_xyz<W: Write>(writer: &mut W, pointcloud: &PointCloud) -> Result<(), XyzError> {
    for p in pointcloud.points() {
        writeln!(writer, "{} {} {}", p[0], p[1], p[2])?;
    }
    Ok(())
}

/// Write a point cloud to an XYZ text file.
pub fn write_xyz(path: impl AsRef<Path>, pointcloud: &PointCloud) -> Result<(), XyzError> {
    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    format_xyz(&mut writer, pointcloud)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_mixed_separators() -> Result<(), XyzError> {
        let text = "1 2 3\n4,5,6\n 7.5 ,\t8e-1 , -9 \n\n";
        let cloud = parse_xyz(text.as_bytes())?;
        assert_eq!(
            cloud.points(),
            &[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.5, 0.8, -9.0]]
        );
        Ok(())
    }

    #[test]
    fn test_parse_wrong_token_count() {
        let res = parse_xyz("1 2 3\n4 5\n".as_bytes());
        assert!(matches!(res, Err(XyzError::Parse { line: 2, .. })));

        let res = parse_xyz("1 2 3 4\n".as_bytes());
        assert!(matches!(res, Err(XyzError::Parse { line: 1, .. })));
    }

    #[test]
    fn test_parse_non_numeric() {
        let res = parse_xyz("x y z\n1 2 3\n".as_bytes());
        match res {
            Err(XyzError::Parse { line, content }) => {
                assert_eq!(line, 1);
                assert_eq!(content, "x y z");
            }
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_non_finite() {
        let res = parse_xyz("1 2 3\nnan 0 0\n".as_bytes());
        assert!(matches!(res, Err(XyzError::Parse { line: 2, .. })));
    }

    #[test]
    fn test_parse_invalid_utf8() {
        let res = parse_xyz(&b"1 2 3\n\xff\xfe 0 0\n4 5 6\n"[..]);
        match res {
            Err(XyzError::Parse { line, content }) => {
                assert_eq!(line, 2);
                assert!(content.ends_with(" 0 0"));
            }
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_crlf_line_endings() -> Result<(), XyzError> {
        let cloud = parse_xyz("1 2 3\r\n4 5 6\r\n".as_bytes())?;
        assert_eq!(cloud.points(), &[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        Ok(())
    }

    #[test]
    fn test_parse_empty() {
        assert!(matches!(
            parse_xyz("".as_bytes()),
            Err(XyzError::EmptyCloud)
        ));
        assert!(matches!(
            parse_xyz("\n  \n".as_bytes()),
            Err(XyzError::EmptyCloud)
        ));
    }

    #[test]
    fn test_write_read_preserves_values() -> Result<(), Box<dyn std::error::Error>> {
        let cloud = PointCloud::new(vec![
            [0.1, -2.0 / 3.0, 1e-300],
            [123456.789, std::f64::consts::PI, -0.0],
        ]);

        let file = NamedTempFile::new()?;
        write_xyz(file.path(), &cloud)?;
        let loaded = read_xyz(file.path())?;

        assert_eq!(loaded.len(), cloud.len());
        for (a, b) in loaded.points().iter().zip(cloud.points()) {
            for i in 0..3 {
                assert_eq!(a[i].to_bits(), b[i].to_bits());
            }
        }
        Ok(())
    }

    #[test]
    fn test_read_file_with_commas() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"1.0,2.0,3.0\n-1.0,-2.0,-3.0")?;
        let cloud = read_xyz(file.path())?;
        assert_eq!(cloud.points(), &[[1.0, 2.0, 3.0], [-1.0, -2.0, -3.0]]);
        Ok(())
    }

    #[test]
    fn test_read_missing_file() {
        let res = read_xyz("/definitely/not/here.xyz");
        assert!(matches!(res, Err(XyzError::Io(_))));
    }
}
