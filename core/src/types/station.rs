use nutype::nutype;

pub const DEFAULT_STATION_NUMBER: &str = "030315";
pub const GRAPH_URL_TEMPLATE: &str =
    "https://www.cehq.gouv.qc.ca/suivihydro/graphique.asp?noStation={station_number}";

/// Hydrometric station identifier, e.g. `030315`.
#[nutype(
    sanitize(trim),
    validate(not_empty, predicate = |s: &str| s.chars().all(|c| c.is_ascii_alphanumeric())),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        AsRef,
        Deref,
        TryFrom,
        Display,
        Serialize,
        Deserialize,
    )
)]
pub struct StationNumber(String);

impl StationNumber {
    /// Graph page of this station on the CEHQ hydrology site.
    pub fn graph_url(&self) -> String {
        GRAPH_URL_TEMPLATE.replace("{station_number}", self.as_ref())
    }
}
