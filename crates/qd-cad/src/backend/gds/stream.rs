//! GDSII stream encoding
//!
//! Record layout:
//! - 2 bytes: u16 BE record length, header included
//! - 1 byte: record type
//! - 1 byte: data type
//! - payload, padded to an even length
//!
//! Reals use the excess-64 base-16 format: one sign bit, a 7-bit exponent
//! and a 56-bit mantissa.

use glam::DVec2;

use crate::backend::{BackendError, BackendResult};

const HEADER: u16 = 0x0002;
const BGNLIB: u16 = 0x0102;
const LIBNAME: u16 = 0x0206;
const UNITS: u16 = 0x0305;
const ENDLIB: u16 = 0x0400;
const BGNSTR: u16 = 0x0502;
const STRNAME: u16 = 0x0606;
const ENDSTR: u16 = 0x0700;
const BOUNDARY: u16 = 0x0800;
const PATH: u16 = 0x0900;
const LAYER: u16 = 0x0D02;
const DATATYPE: u16 = 0x0E02;
const WIDTH: u16 = 0x0F03;
const XY: u16 = 0x1003;
const ENDEL: u16 = 0x1100;

/// Stream format version written in HEADER
const VERSION: i16 = 600;

/// Most vertices an element may carry; boundaries repeat the first point
/// and one XY record holds at most 8191 points.
pub const MAX_VERTICES: usize = 8190;

/// Largest record payload: the length field is a u16 and includes the header
const MAX_PAYLOAD: usize = u16::MAX as usize - 5;

/// Modification/access time, fixed so output is reproducible
const TIMESTAMP: [i16; 12] = [1970, 1, 1, 0, 0, 0, 1970, 1, 1, 0, 0, 0];

/// A polygon or path on one layer, coordinates in millimetres
#[derive(Debug, Clone, PartialEq)]
pub struct StreamElement<'a> {
    pub layer: u16,
    pub datatype: u16,
    pub points: &'a [DVec2],
    pub closed: bool,
}

/// Library settings
#[derive(Debug, Clone, PartialEq)]
pub struct StreamLibrary<'a> {
    pub name: &'a str,
    pub cell: &'a str,
    /// User unit in metres
    pub unit: f64,
    /// Database unit in metres
    pub precision: f64,
}

/// Encode a library with a single cell
pub fn encode(library: &StreamLibrary<'_>, elements: &[StreamElement<'_>]) -> BackendResult<Vec<u8>> {
    if library.precision <= 0.0 || library.unit <= 0.0 {
        return Err(BackendError::InvalidGeometry(format!(
            "unit {} and precision {} must be positive",
            library.unit, library.precision
        )));
    }

    let mut buf = Vec::new();
    record(&mut buf, HEADER, &VERSION.to_be_bytes());
    record(&mut buf, BGNLIB, &i16_payload(&TIMESTAMP));
    record(&mut buf, LIBNAME, &string_payload("library", library.name)?);

    let mut units = Vec::with_capacity(16);
    units.extend_from_slice(&real8(library.precision / library.unit));
    units.extend_from_slice(&real8(library.precision));
    record(&mut buf, UNITS, &units);

    record(&mut buf, BGNSTR, &i16_payload(&TIMESTAMP));
    record(&mut buf, STRNAME, &string_payload("cell", library.cell)?);
    for element in elements {
        write_element(&mut buf, element, library.precision)?;
    }
    record(&mut buf, ENDSTR, &[]);
    record(&mut buf, ENDLIB, &[]);

    Ok(buf)
}

fn write_element(buf: &mut Vec<u8>, element: &StreamElement<'_>, precision: f64) -> BackendResult<()> {
    let min = if element.closed { 3 } else { 2 };
    if element.points.len() < min {
        return Err(BackendError::InvalidGeometry(format!(
            "element on layer {} has {} points",
            element.layer,
            element.points.len()
        )));
    }
    if element.points.len() > MAX_VERTICES {
        return Err(BackendError::InvalidGeometry(format!(
            "element on layer {} has {} vertices, at most {} are allowed",
            element.layer,
            element.points.len(),
            MAX_VERTICES
        )));
    }

    let mut xy = Vec::with_capacity((element.points.len() + 1) * 8);
    for point in element.points {
        xy.extend_from_slice(&database_units(point.x, precision)?.to_be_bytes());
        xy.extend_from_slice(&database_units(point.y, precision)?.to_be_bytes());
    }
    if element.closed {
        // Boundaries end on their first point
        let closing = xy[..8].to_vec();
        xy.extend_from_slice(&closing);
    }

    record(buf, if element.closed { BOUNDARY } else { PATH }, &[]);
    record(buf, LAYER, &(element.layer as i16).to_be_bytes());
    record(buf, DATATYPE, &(element.datatype as i16).to_be_bytes());
    if !element.closed {
        record(buf, WIDTH, &0i32.to_be_bytes());
    }
    record(buf, XY, &xy);
    record(buf, ENDEL, &[]);
    Ok(())
}

/// Millimetres to integer database units
fn database_units(mm: f64, precision: f64) -> BackendResult<i32> {
    let value = (mm * 1e-3 / precision).round();
    if !value.is_finite() || value < i32::MIN as f64 || value > i32::MAX as f64 {
        return Err(BackendError::InvalidGeometry(format!(
            "coordinate {}mm does not fit the database grid",
            mm
        )));
    }
    Ok(value as i32)
}

fn record(buf: &mut Vec<u8>, tag: u16, payload: &[u8]) {
    let len = (4 + payload.len()) as u16;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&tag.to_be_bytes());
    buf.extend_from_slice(payload);
}

fn i16_payload(values: &[i16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

fn string_payload(what: &str, text: &str) -> BackendResult<Vec<u8>> {
    let mut bytes = text.as_bytes().to_vec();
    if bytes.len() % 2 == 1 {
        bytes.push(0);
    }
    if bytes.len() > MAX_PAYLOAD {
        return Err(BackendError::InvalidGeometry(format!(
            "{} name is {} bytes long, at most {} are allowed",
            what,
            text.len(),
            MAX_PAYLOAD
        )));
    }
    Ok(bytes)
}

/// Encode an 8-byte excess-64 real
pub fn real8(value: f64) -> [u8; 8] {
    if value == 0.0 {
        return [0; 8];
    }

    let sign = if value < 0.0 { 0x80u8 } else { 0 };
    let mut mantissa = value.abs();
    let mut exponent: i32 = 64;
    while mantissa >= 1.0 {
        mantissa /= 16.0;
        exponent += 1;
    }
    while mantissa < 1.0 / 16.0 {
        mantissa *= 16.0;
        exponent -= 1;
    }

    let mut bits = (mantissa * (1u64 << 56) as f64).round() as u64;
    if bits >= 1 << 56 {
        bits >>= 4;
        exponent += 1;
    }

    let mut out = [0u8; 8];
    out[0] = sign | (exponent.clamp(0, 127) as u8);
    out[1..].copy_from_slice(&bits.to_be_bytes()[1..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> StreamLibrary<'static> {
        StreamLibrary {
            name: "LIB",
            cell: "TOP",
            unit: 1e-6,
            precision: 1e-9,
        }
    }

    #[test]
    fn test_real8_known_values() {
        assert_eq!(real8(1.0), [0x41, 0x10, 0, 0, 0, 0, 0, 0]);
        assert_eq!(real8(0.5), [0x40, 0x80, 0, 0, 0, 0, 0, 0]);
        assert_eq!(real8(-1.0), [0xC1, 0x10, 0, 0, 0, 0, 0, 0]);
        assert_eq!(real8(0.0), [0; 8]);
    }

    #[test]
    fn test_empty_library_layout() {
        let bytes = encode(&library(), &[]).unwrap();

        // HEADER, version 600
        assert_eq!(&bytes[..6], &[0x00, 0x06, 0x00, 0x02, 0x02, 0x58]);
        // BGNLIB with 12 timestamp words
        assert_eq!(&bytes[6..10], &[0x00, 0x1C, 0x01, 0x02]);
        assert_eq!(&bytes[10..12], &1970i16.to_be_bytes());
        // LIBNAME "LIB" padded to four bytes
        assert_eq!(&bytes[34..42], &[0x00, 0x08, 0x02, 0x06, b'L', b'I', b'B', 0]);
        // ENDSTR, ENDLIB
        assert_eq!(&bytes[bytes.len() - 8..], &[0, 4, 7, 0, 0, 4, 4, 0]);
    }

    #[test]
    fn test_boundary_repeats_first_point() {
        let points = [
            DVec2::new(0.0, 0.0),
            DVec2::new(0.001, 0.0),
            DVec2::new(0.001, 0.002),
        ];
        let element = StreamElement {
            layer: 5,
            datatype: 1,
            points: &points,
            closed: true,
        };
        let mut buf = Vec::new();
        write_element(&mut buf, &element, 1e-9).unwrap();

        // BOUNDARY, LAYER, DATATYPE
        assert_eq!(&buf[..4], &[0, 4, 0x08, 0x00]);
        assert_eq!(&buf[4..10], &[0, 6, 0x0D, 0x02, 0, 5]);
        assert_eq!(&buf[10..16], &[0, 6, 0x0E, 0x02, 0, 1]);
        // XY holds four points: 4 + 32 bytes
        assert_eq!(&buf[16..20], &[0, 36, 0x10, 0x03]);
        // 0.001mm is 1000 database units
        assert_eq!(&buf[28..32], &1000i32.to_be_bytes());
        assert_eq!(&buf[44..52], &buf[20..28]);
        assert_eq!(&buf[buf.len() - 4..], &[0, 4, 0x11, 0x00]);
    }

    #[test]
    fn test_open_element_is_zero_width_path() {
        let points = [DVec2::new(0.0, 0.0), DVec2::new(0.01, 0.0)];
        let element = StreamElement {
            layer: 1,
            datatype: 0,
            points: &points,
            closed: false,
        };
        let mut buf = Vec::new();
        write_element(&mut buf, &element, 1e-9).unwrap();

        assert_eq!(&buf[..4], &[0, 4, 0x09, 0x00]);
        assert_eq!(&buf[16..24], &[0, 8, 0x0F, 0x03, 0, 0, 0, 0]);
    }

    #[test]
    fn test_name_length_limit() {
        let long = "C".repeat(MAX_PAYLOAD + 1);
        let result = encode(
            &StreamLibrary {
                cell: &long,
                ..library()
            },
            &[],
        );
        assert!(matches!(result, Err(BackendError::InvalidGeometry(_))));

        let fits = "L".repeat(MAX_PAYLOAD);
        let bytes = encode(
            &StreamLibrary {
                name: &fits,
                ..library()
            },
            &[],
        )
        .unwrap();
        // LIBNAME length field counts the four-byte header
        assert_eq!(&bytes[34..36], &((MAX_PAYLOAD + 4) as u16).to_be_bytes());
    }

    #[test]
    fn test_vertex_limit() {
        let points: Vec<DVec2> = (0..=MAX_VERTICES)
            .map(|i| DVec2::new(i as f64 * 1e-3, (i % 2) as f64 * 1e-3))
            .collect();
        let element = StreamElement {
            layer: 1,
            datatype: 0,
            points: &points,
            closed: true,
        };
        let result = encode(&library(), &[element]);
        assert!(matches!(result, Err(BackendError::InvalidGeometry(_))));
    }
}
