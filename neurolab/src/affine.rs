//! FSL affine matrices.
//!
//! FSL stores a 4x4 matrix as four lines of four whitespace separated numbers,
//! acting on column vectors in world millimetres.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use glam::{DMat4, DVec3};

use crate::error::{Error, Result};

const SINGULAR_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMat(DMat4);

impl Default for AffineMat {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineMat {
    pub fn identity() -> Self {
        Self(DMat4::IDENTITY)
    }

    pub fn from_rows(rows: [[f64; 4]; 4]) -> Self {
        Self(DMat4::from_cols_array_2d(&rows).transpose())
    }

    pub fn rows(&self) -> [[f64; 4]; 4] {
        self.0.transpose().to_cols_array_2d()
    }

    pub fn translation(offset: DVec3) -> Self {
        Self(DMat4::from_translation(offset))
    }

    pub fn scale(scale: DVec3) -> Self {
        Self(DMat4::from_scale(scale))
    }

    pub fn rotation_z(angle: f64) -> Self {
        Self(DMat4::from_rotation_z(angle))
    }

    pub fn matrix(&self) -> DMat4 {
        self.0
    }

    /// Composition applying `self` first, then `next`.
    pub fn then(&self, next: &AffineMat) -> AffineMat {
        AffineMat(next.0 * self.0)
    }

    /// Inverse matrix; `origin` names the file in the error when singular.
    pub fn inverse(&self, origin: &Path) -> Result<AffineMat> {
        if self.0.determinant().abs() < SINGULAR_EPSILON {
            return Err(Error::SingularMatrix(origin.to_path_buf()));
        }
        Ok(AffineMat(self.0.inverse()))
    }

    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.0.transform_point3(point)
    }

    pub fn abs_diff_eq(&self, other: &AffineMat, max_abs_diff: f64) -> bool {
        self.0.abs_diff_eq(other.0, max_abs_diff)
    }

    pub fn parse(text: &str, origin: &Path) -> Result<AffineMat> {
        let parse_error = |reason: String| Error::MatParse {
            path: origin.to_path_buf(),
            reason,
        };

        let rows: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if rows.len() != 4 {
            return Err(parse_error(format!("expected 4 rows, found {}", rows.len())));
        }

        let mut values = [[0.0f64; 4]; 4];
        for (row_idx, row) in rows.iter().enumerate() {
            let numbers = row
                .split_whitespace()
                .map(|token| {
                    token
                        .parse::<f64>()
                        .map_err(|_| parse_error(format!("invalid number '{}'", token)))
                })
                .collect::<Result<Vec<f64>>>()?;
            if numbers.len() != 4 {
                return Err(parse_error(format!(
                    "row {} has {} values",
                    row_idx + 1,
                    numbers.len()
                )));
            }
            values[row_idx].copy_from_slice(&numbers);
        }

        Ok(AffineMat::from_rows(values))
    }

    pub fn read(path: &Path) -> Result<AffineMat> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&text, path)
    }

    pub fn to_fsl_string(&self) -> String {
        let mut out = String::with_capacity(4 * 4 * 16);
        for row in self.rows() {
            for value in row {
                let _ = write!(out, "{:.10}  ", value);
            }
            out.push('\n');
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_fsl_string()).map_err(|e| Error::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AffineMat {
        AffineMat::from_rows([
            [1.02, 0.01, -0.03, 4.5],
            [-0.02, 0.98, 0.05, -12.25],
            [0.03, -0.04, 1.1, 7.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    #[test]
    fn rows_are_row_major() {
        let m = AffineMat::translation(DVec3::new(1.0, 2.0, 3.0));
        let rows = m.rows();
        assert_eq!(rows[0], [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(rows[1], [0.0, 1.0, 0.0, 2.0]);
        assert_eq!(rows[2], [0.0, 0.0, 1.0, 3.0]);
        assert_eq!(rows[3], [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(sample().rows()[1][3], -12.25);
    }

    #[test]
    fn parses_fsl_text() {
        let text = "1.000000  0.000000  0.000000  -2.5  \n\
                    0.000000  1.000000  0.000000  3.0  \n\
                    0.000000  0.000000  1.000000  0.0  \n\
                    0  0  0  1  \n\n";
        let m = AffineMat::parse(text, Path::new("x.mat")).unwrap();
        assert!(m.abs_diff_eq(&AffineMat::translation(DVec3::new(-2.5, 3.0, 0.0)), 1e-12));
    }

    #[test]
    fn rejects_malformed_text() {
        let origin = Path::new("bad.mat");
        assert!(matches!(
            AffineMat::parse("1 0 0 0\n0 1 0 0\n0 0 1 0\n", origin),
            Err(Error::MatParse { .. })
        ));
        assert!(matches!(
            AffineMat::parse("1 0 0\n0 1 0 0\n0 0 1 0\n0 0 0 1\n", origin),
            Err(Error::MatParse { .. })
        ));
        assert!(matches!(
            AffineMat::parse("1 0 0 x\n0 1 0 0\n0 0 1 0\n0 0 0 1\n", origin),
            Err(Error::MatParse { .. })
        ));
    }

    #[test]
    fn text_round_trip_keeps_precision() {
        let m = sample();
        let parsed = AffineMat::parse(&m.to_fsl_string(), Path::new("m.mat")).unwrap();
        assert!(parsed.abs_diff_eq(&m, 1e-9));
    }

    #[test]
    fn composition_applies_first_matrix_first() {
        let shift = AffineMat::translation(DVec3::new(10.0, 0.0, 0.0));
        let double = AffineMat::scale(DVec3::splat(2.0));

        let p = DVec3::new(1.0, 1.0, 1.0);
        assert_eq!(shift.then(&double).transform_point(p), DVec3::new(22.0, 2.0, 2.0));
        assert_eq!(double.then(&shift).transform_point(p), DVec3::new(12.0, 2.0, 2.0));
    }

    #[test]
    fn inverse_of_inverse_is_original() {
        let m = sample();
        let origin = Path::new("m.mat");
        let inv = m.inverse(origin).unwrap();
        assert!(m.then(&inv).abs_diff_eq(&AffineMat::identity(), 1e-12));
        assert!(inv.inverse(origin).unwrap().abs_diff_eq(&m, 1e-12));
    }

    #[test]
    fn singular_matrix_is_rejected() {
        let flat = AffineMat::scale(DVec3::new(1.0, 0.0, 1.0));
        assert!(matches!(
            flat.inverse(Path::new("flat.mat")),
            Err(Error::SingularMatrix(_))
        ));
    }
}
