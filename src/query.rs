//! Spatial and temporal filters for the OData product catalog.
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Spatial reference used for the intersects predicate.
pub const SRID: u32 = 4326;

/// Bounding box in geographic degrees. Ordering of the edges is not checked.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct AreaOfInterest {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl AreaOfInterest {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Corners of the closed ring, clockwise from the north-west corner.
    /// The first vertex is repeated as the last.
    pub fn ring(&self) -> [(f64, f64); 5] {
        [
            (self.west, self.north),
            (self.east, self.north),
            (self.east, self.south),
            (self.west, self.south),
            (self.west, self.north),
        ]
    }

    /// Well-known-text polygon, coordinates in `lon lat` order.
    pub fn to_wkt(&self) -> String {
        let vertices = self
            .ring()
            .iter()
            .map(|(lon, lat)| format!("{lon} {lat}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("POLYGON(({vertices}))")
    }
}

/// Acquisition window. The catalog compares with strict `gt`/`lt`, so the
/// bounds are midnight UTC of `start` and `end`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn lower_bound(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    pub fn upper_bound(&self) -> DateTime<Utc> {
        self.end.and_time(NaiveTime::MIN).and_utc()
    }

    /// True when no instant can be strictly between the two bounds.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

fn odata_timestamp(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// A catalog search: the `$filter` expression plus an optional page size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
    pub filter: String,
    pub top: Option<u32>,
}

impl CatalogQuery {
    pub fn build(aoi: &AreaOfInterest, dates: &DateRange, collection: &str) -> Self {
        // OData string literals double an embedded single quote.
        let collection = collection.replace('\'', "''");
        let filter = format!(
            "Collection/Name eq '{collection}' \
             and OData.CSC.Intersects(area=geography'SRID={SRID};{polygon}') \
             and ContentDate/Start gt {start} \
             and ContentDate/Start lt {end}",
            polygon = aoi.to_wkt(),
            start = odata_timestamp(dates.lower_bound()),
            end = odata_timestamp(dates.upper_bound()),
        );
        Self { filter, top: None }
    }

    pub fn with_top(mut self, top: Option<u32>) -> Self {
        self.top = top;
        self
    }

    /// Query-string pairs in the order they are sent.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("$filter", self.filter.clone())];
        if let Some(top) = self.top {
            params.push(("$top", top.to_string()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aoi() -> AreaOfInterest {
        AreaOfInterest::new(-34.81, -34.82, -57.89, -57.8961)
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_ring_is_closed() {
        let boxes = [
            aoi(),
            AreaOfInterest::new(60.0, 59.5, 11.0, 10.0),
            AreaOfInterest::new(0.0, 0.0, 0.0, 0.0),
            AreaOfInterest::new(89.9, -89.9, 179.9, -179.9),
        ];
        for b in boxes {
            let ring = b.ring();
            assert_eq!(ring.len(), 5);
            assert_eq!(ring[0], ring[4]);
        }
    }

    #[test]
    fn test_wkt_has_five_pairs_starting_north_west() {
        let wkt = aoi().to_wkt();
        assert_eq!(
            wkt,
            "POLYGON((-57.8961 -34.81, -57.89 -34.81, -57.89 -34.82, -57.8961 -34.82, -57.8961 -34.81))"
        );
        let inner = wkt.trim_start_matches("POLYGON((").trim_end_matches("))");
        let pairs: Vec<&str> = inner.split(", ").collect();
        assert_eq!(pairs.len(), 5);
        assert_eq!(pairs.first(), pairs.last());
    }

    #[test]
    fn test_filter_expression() {
        let dates = DateRange::new(date("2023-04-01"), date("2023-05-01"));
        let query = CatalogQuery::build(&aoi(), &dates, "SENTINEL-2");
        assert_eq!(
            query.filter,
            "Collection/Name eq 'SENTINEL-2' \
             and OData.CSC.Intersects(area=geography'SRID=4326;POLYGON((-57.8961 -34.81, -57.89 -34.81, -57.89 -34.82, -57.8961 -34.82, -57.8961 -34.81))') \
             and ContentDate/Start gt 2023-04-01T00:00:00.000Z \
             and ContentDate/Start lt 2023-05-01T00:00:00.000Z"
        );
        assert_eq!(query.top, None);
    }

    #[test]
    fn test_collection_quotes_are_escaped() {
        let dates = DateRange::new(date("2023-04-01"), date("2023-05-01"));
        let query = CatalogQuery::build(&aoi(), &dates, "O'Brien's set");
        assert!(query
            .filter
            .starts_with("Collection/Name eq 'O''Brien''s set' and OData.CSC.Intersects"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let dates = DateRange::new(date("2024-01-01"), date("2024-02-01"));
        let a = CatalogQuery::build(&aoi(), &dates, "SENTINEL-1");
        let b = CatalogQuery::build(&aoi(), &dates, "SENTINEL-1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_params_include_top_when_set() {
        let dates = DateRange::new(date("2024-01-01"), date("2024-02-01"));
        let query = CatalogQuery::build(&aoi(), &dates, "SENTINEL-2").with_top(Some(100));
        let params = query.params();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].0, "$filter");
        assert_eq!(params[1], ("$top", "100".to_string()));
    }

    #[test]
    fn test_empty_range_admits_nothing() {
        let day = date("2023-04-01");
        let dates = DateRange::new(day, day);
        assert!(dates.is_empty());

        // ContentDate/Start values a catalog could hold around that day
        let fixture = [
            "2023-03-31T23:59:59.999Z",
            "2023-04-01T00:00:00.000Z",
            "2023-04-01T00:00:00.001Z",
            "2023-04-01T13:51:21.024Z",
            "2023-04-02T00:00:00.000Z",
        ];
        let matches = fixture
            .iter()
            .map(|s| s.parse::<DateTime<Utc>>().unwrap())
            .filter(|t| *t > dates.lower_bound() && *t < dates.upper_bound())
            .count();
        assert_eq!(matches, 0);

        let query = CatalogQuery::build(&aoi(), &dates, "SENTINEL-2");
        assert!(query
            .filter
            .ends_with("gt 2023-04-01T00:00:00.000Z and ContentDate/Start lt 2023-04-01T00:00:00.000Z"));
    }

    #[test]
    fn test_non_empty_range() {
        let dates = DateRange::new(date("2023-04-01"), date("2023-04-02"));
        assert!(!dates.is_empty());
        let t: DateTime<Utc> = "2023-04-01T13:51:21.024Z".parse().unwrap();
        assert!(t > dates.lower_bound() && t < dates.upper_bound());
        assert_eq!(dates.to_string(), "2023-04-01..2023-04-02");
    }
}
