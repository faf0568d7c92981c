use std::fmt;
use std::path::Path;

use revgeo_io::ReverseGeocoder;

use crate::errors::FrontendError;

/// 单个坐标的查询结果。
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAnswer {
    pub lon: f32,
    pub lat: f32,
    pub labels: Vec<String>,
}

/// `   11.5755  48.1373||Munich||Bavaria`
impl fmt::Display for QueryAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:8.4} {:8.4}", self.lon, self.lat)?;
        for label in &self.labels {
            write!(f, "||{label}")?;
        }
        Ok(())
    }
}

pub fn open_index(path: &Path) -> Result<ReverseGeocoder, FrontendError> {
    Ok(ReverseGeocoder::open(path)?)
}

/// 批量查询，结果顺序与输入一致。
pub fn query_points(geocoder: &ReverseGeocoder, points: &[(f32, f32)]) -> Vec<QueryAnswer> {
    geocoder
        .lookup_many(points)
        .into_iter()
        .zip(points)
        .map(|(labels, &(lon, lat))| QueryAnswer { lon, lat, labels })
        .collect()
}
