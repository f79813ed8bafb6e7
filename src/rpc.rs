//! Rational Polynomial Coefficient sensor model: parsing the RPC00B /
//! RPC00A record and evaluating the ground-to-image transform.
//!
//! The transform is pure: normalize the ground point by the model offsets
//! and scales, evaluate the 20 bivariate-cubic terms, take the two
//! numerator/denominator ratios, de-normalize sample and line.

use crate::error::{NitfError, Result};
use crate::field::FieldReader;
use crate::tre::find_tre;

/// Minimum RPC00B payload: header fields plus four 20x12 coefficient sets.
pub const RPC_MIN_LEN: usize = 801 + 19 * 12 + 12;

/// RPC00A stores its coefficients in a different term order; this maps a
/// RPC00B term index to the RPC00A source index.
const RPC00A_COEFF_MAP: [usize; 20] = [
    0, 1, 2, 3, 4, 5, 6, 10, 7, 8, 9, 11, 14, 17, 12, 15, 18, 13, 16, 19,
];

/// Parsed rational-polynomial model.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RpcModel {
    /// The record's own "populated" flag.
    pub success: bool,
    pub err_bias: f64,
    pub err_rand: f64,
    pub line_off: f64,
    pub samp_off: f64,
    pub lat_off: f64,
    pub long_off: f64,
    pub height_off: f64,
    pub line_scale: f64,
    pub samp_scale: f64,
    pub lat_scale: f64,
    pub long_scale: f64,
    pub height_scale: f64,
    pub line_num: [f64; 20],
    pub line_den: [f64; 20],
    pub samp_num: [f64; 20],
    pub samp_den: [f64; 20],
}

impl RpcModel {
    /// Parse from a raw RPC00B payload. Set `remap_00a` when the span came
    /// from an RPC00A record, whose coefficient order differs.
    pub fn from_tre(data: &[u8], remap_00a: bool) -> Result<RpcModel> {
        if data.len() < RPC_MIN_LEN {
            return Err(NitfError::TreSize(format!(
                "RPC record of {} bytes is shorter than the {} byte minimum",
                data.len(),
                RPC_MIN_LEN
            )));
        }
        let r = FieldReader::new(data);
        let f = |off: usize, len: usize| r.f64_at(off, len).unwrap_or(0.0);

        let mut model = RpcModel {
            success: r.uint_or_zero_at(0, 1) == Some(1),
            err_bias: f(1, 7),
            err_rand: f(8, 7),
            line_off: f(15, 6),
            samp_off: f(21, 5),
            lat_off: f(26, 8),
            long_off: f(34, 9),
            height_off: f(43, 5),
            line_scale: f(48, 6),
            samp_scale: f(54, 5),
            lat_scale: f(59, 8),
            long_scale: f(67, 9),
            height_scale: f(76, 5),
            line_num: [0.0; 20],
            line_den: [0.0; 20],
            samp_num: [0.0; 20],
            samp_den: [0.0; 20],
        };
        for i in 0..20 {
            let src = if remap_00a { RPC00A_COEFF_MAP[i] } else { i };
            model.line_num[i] = f(81 + src * 12, 12);
            model.line_den[i] = f(321 + src * 12, 12);
            model.samp_num[i] = f(561 + src * 12, 12);
            model.samp_den[i] = f(801 + src * 12, 12);
        }
        Ok(model)
    }

    /// Look for an RPC00B (or RPC00A) record in a TRE blob and parse it.
    pub fn from_tre_blob(blob: &[u8]) -> Option<Result<RpcModel>> {
        if let Some(data) = find_tre(blob, "RPC00B") {
            return Some(Self::from_tre(data, false));
        }
        find_tre(blob, "RPC00A").map(|data| Self::from_tre(data, true))
    }

    /// Ground-to-image: longitude/latitude in degrees, height in meters,
    /// to (sample, line) pixel coordinates.
    pub fn geo_to_image(&self, long: f64, lat: f64, height: f64) -> (f64, f64) {
        let x = (long - self.long_off) / self.long_scale;
        let y = (lat - self.lat_off) / self.lat_scale;
        let z = (height - self.height_off) / self.height_scale;

        let terms = poly_terms(x, y, z);

        let mut samp_num = 0.0;
        let mut samp_den = 0.0;
        let mut line_num = 0.0;
        let mut line_den = 0.0;
        for i in 0..20 {
            samp_num += self.samp_num[i] * terms[i];
            samp_den += self.samp_den[i] * terms[i];
            line_num += self.line_num[i] * terms[i];
            line_den += self.line_den[i] * terms[i];
        }

        let sample = samp_num / samp_den * self.samp_scale + self.samp_off;
        let line = line_num / line_den * self.line_scale + self.line_off;
        (sample, line)
    }
}

/// The 20 terms of the bivariate-cubic polynomial in normalized
/// (longitude, latitude, height).
fn poly_terms(x: f64, y: f64, z: f64) -> [f64; 20] {
    [
        1.0,
        x,
        y,
        z,
        x * y,
        x * z,
        y * z,
        x * x,
        y * y,
        z * z,
        x * y * z,
        x * x * x,
        x * y * y,
        x * z * z,
        x * x * y,
        y * y * y,
        y * z * z,
        x * x * z,
        y * y * z,
        z * z * z,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_short_is_rejected() {
        let data = vec![b'0'; 100];
        assert!(matches!(
            RpcModel::from_tre(&data, false),
            Err(NitfError::TreSize(_))
        ));
    }
}
