//! Tabulated one-dimensional functions (for example leaf area against
//! relative age) read from a small text format:
//!
//! ```text
//! fver 1 1
//! funcs 1
//! fname leaf_area
//! samples 5
//! flip off
//! points 3
//! 0.0 0.0
//! 0.5 0.4
//! 1.0 1.0
//! ```

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flip {
    /// Clamp to the end values outside the sampled domain.
    Off,
    /// Mirror about the exceeded boundary, then clamp.
    On,
}

impl FromStr for Flip {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "on" => Ok(Flip::On),
            "off" => Ok(Flip::Off),
            other => Err(Error::invalid(format!(
                "flip must be 'on' or 'off', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FSet {
    flip: Flip,
    x: Vec<f64>,
    y: Vec<f64>,
}

impl FSet {
    pub fn new(flip: &str, x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        let flip = flip.parse::<Flip>()?;
        if x.len() != y.len() {
            return Err(Error::invalid(format!(
                "function has {} abscissae but {} ordinates",
                x.len(),
                y.len()
            )));
        }
        if x.len() < 2 {
            return Err(Error::invalid("function needs at least two points"));
        }
        if x.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(Error::invalid("function abscissae must be strictly increasing"));
        }
        Ok(Self { flip, x, y })
    }

    /// Leaf expansion against relative age in `[0, 1]`.
    pub fn leaf_area_default() -> Self {
        Self {
            flip: Flip::Off,
            x: vec![0.0, 0.1, 0.25, 0.4, 0.5, 0.6, 0.75, 0.9, 1.0],
            y: vec![0.0, 0.03, 0.12, 0.3, 0.45, 0.62, 0.83, 0.96, 1.0],
        }
    }

    pub fn flip(&self) -> Flip {
        self.flip
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    pub fn gety(&self, x: f64) -> f64 {
        let (lo, hi) = self.domain();
        let x = match self.flip {
            Flip::On if x > hi => 2.0 * hi - x,
            Flip::On if x < lo => 2.0 * lo - x,
            _ => x,
        }
        .clamp(lo, hi);

        let idx = self.x.partition_point(|v| *v <= x);
        if idx == 0 {
            return self.y[0];
        }
        if idx >= self.x.len() {
            return self.y[self.y.len() - 1];
        }
        let (x0, x1) = (self.x[idx - 1], self.x[idx]);
        let (y0, y1) = (self.y[idx - 1], self.y[idx]);
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }
}

fn parse_err(message: impl Into<String>) -> Error {
    Error::parse("function table", message)
}

fn keyword<'a>(line: Option<&'a str>, key: &str) -> Result<&'a str> {
    let line = line.ok_or_else(|| parse_err(format!("missing '{key}'")))?;
    let mut parts = line.splitn(2, char::is_whitespace);
    match (parts.next(), parts.next()) {
        (Some(k), Some(rest)) if k == key => Ok(rest.trim()),
        _ => Err(parse_err(format!("expected '{key}', found '{line}'"))),
    }
}

fn number<T: FromStr>(text: &str, what: &str) -> Result<T> {
    text.parse::<T>()
        .map_err(|_| parse_err(format!("bad {what} '{text}'")))
}

/// Parse every function in `text`, in file order.
pub fn parse_functions(text: &str) -> Result<Vec<(String, FSet)>> {
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));

    let version = keyword(lines.next(), "fver")?;
    if version.split_whitespace().count() != 2 {
        return Err(parse_err(format!("bad version '{version}'")));
    }
    let count: usize = number(keyword(lines.next(), "funcs")?, "function count")?;

    let mut out = Vec::new();
    for _ in 0..count {
        let name = keyword(lines.next(), "fname")?.to_string();
        let _samples: usize = number(keyword(lines.next(), "samples")?, "sample count")?;
        let flip = keyword(lines.next(), "flip")?.to_string();
        let points: usize = number(keyword(lines.next(), "points")?, "point count")?;
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for _ in 0..points {
            let line = lines
                .next()
                .ok_or_else(|| parse_err(format!("function '{name}' is missing points")))?;
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next(), fields.next()) {
                (Some(x), Some(y), None) => {
                    xs.push(number(x, "abscissa")?);
                    ys.push(number(y, "ordinate")?);
                }
                _ => return Err(parse_err(format!("bad point line '{line}'"))),
            }
        }
        let fset = FSet::new(&flip, xs, ys)?;
        out.push((name, fset));
    }
    Ok(out)
}

pub fn read_function(path: impl AsRef<Path>, name: &str) -> Result<FSet> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)?;
    parse_functions(&text)?
        .into_iter()
        .find(|(n, _)| n == name)
        .map(|(_, f)| f)
        .ok_or_else(|| parse_err(format!("no function named '{name}' in {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "fver 1 1\nfuncs 2\n\
        fname ramp\nsamples 3\nflip off\npoints 3\n0 0\n0.5 1\n1 3\n\
        fname tent\nsamples 2\nflip on\npoints 2\n0 0\n1 2\n";

    fn approx_eq(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-12, "expected {b}, got {a}");
    }

    #[test]
    fn interpolates_between_samples() {
        let funcs = parse_functions(TABLE).unwrap();
        let ramp = &funcs[0].1;
        approx_eq(ramp.gety(0.25), 0.5);
        approx_eq(ramp.gety(0.75), 2.0);
        approx_eq(ramp.gety(1.0), 3.0);
    }

    #[test]
    fn flip_controls_extrapolation() {
        let funcs = parse_functions(TABLE).unwrap();
        approx_eq(funcs[0].1.gety(1.5), 3.0);
        approx_eq(funcs[0].1.gety(-1.0), 0.0);
        let tent = &funcs[1].1;
        assert_eq!(tent.flip(), Flip::On);
        approx_eq(tent.gety(1.25), 1.5);
    }

    #[test]
    fn rejects_bad_flip_and_shapes() {
        assert!(matches!(
            FSet::new("maybe", vec![0.0, 1.0], vec![0.0, 1.0]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(FSet::new("on", vec![0.0], vec![0.0]).is_err());
        assert!(FSet::new("on", vec![1.0, 0.0], vec![0.0, 1.0]).is_err());
    }

    #[test]
    fn malformed_text_is_a_parse_error() {
        let err = parse_functions("fver 1 1\nfuncs 1\nfname a\nsamples 2\nflip off\npoints 2\n0 0\n")
            .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn oversized_counts_are_a_parse_error() {
        let huge = format!(
            "fver 1 1\nfuncs 1\nfname a\nsamples 2\nflip off\npoints {}\n0 0\n1 1\n",
            usize::MAX
        );
        assert!(matches!(parse_functions(&huge), Err(Error::Parse { .. })));

        let many = format!(
            "fver 1 1\nfuncs {}\nfname a\nsamples 2\nflip off\npoints 2\n0 0\n1 1\n",
            usize::MAX
        );
        assert!(matches!(parse_functions(&many), Err(Error::Parse { .. })));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = read_function("/nonexistent/malus/functions.fset", "leaf_area").unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn default_leaf_curve_is_monotone() {
        let f = FSet::leaf_area_default();
        let mut last = f.gety(0.0);
        for i in 1..=20 {
            let y = f.gety(i as f64 / 20.0);
            assert!(y >= last);
            last = y;
        }
        approx_eq(f.gety(1.0), 1.0);
    }
}
