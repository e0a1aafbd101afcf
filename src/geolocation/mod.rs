//! IP Geolocation using the MaxMind GeoLite2 database
//!
//! The recorder only needs coarse location (country, city, coordinates)
//! for an attempt's IP. It asks a [`GeoResolver`]; [`GeoIpService`] is the
//! production implementation over a GeoLite2-City file, which must be
//! downloaded separately from MaxMind.

use maxminddb::{geoip2, Reader};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{Coordinates, Location};

/// Errors that can occur during geolocation lookups
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Failed to open database: {0}")]
    DatabaseOpen(#[from] maxminddb::MaxMindDBError),

    #[error("IP address not found in database")]
    NotFound,

    #[error("Location data missing for IP address")]
    NoLocation,

    #[error("Database file not found: {0}")]
    FileNotFound(String),
}

/// Maps an IP address to a coarse location.
///
/// Implementations return `None` for anything they cannot place; callers
/// treat that as "no location", never as a failure.
pub trait GeoResolver: Send + Sync {
    fn resolve(&self, ip: &IpAddr) -> Option<Location>;
}

/// GeoIP lookup service using MaxMind GeoLite2-City database
pub struct GeoIpService {
    reader: Arc<Reader<Vec<u8>>>,
}

impl GeoIpService {
    /// Create a new GeoIP service from a MaxMind database file
    ///
    /// # Errors
    ///
    /// Returns an error if the database file cannot be opened or is invalid.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, GeoError> {
        let path = db_path.as_ref();
        if !path.exists() {
            return Err(GeoError::FileNotFound(path.display().to_string()));
        }

        let reader = Reader::open_readfile(path)?;
        Ok(GeoIpService {
            reader: Arc::new(reader),
        })
    }

    fn lookup_city(&self, ip: &IpAddr) -> Result<geoip2::City<'_>, GeoError> {
        self.reader.lookup(*ip).map_err(|e| match e {
            maxminddb::MaxMindDBError::AddressNotFoundError(_) => GeoError::NotFound,
            other => GeoError::DatabaseOpen(other),
        })
    }

    /// Look up the coordinates of an IP address
    pub fn lookup(&self, ip: &IpAddr) -> Result<Coordinates, GeoError> {
        let city = self.lookup_city(ip)?;

        let location = city.location.ok_or(GeoError::NoLocation)?;
        let latitude = location.latitude.ok_or(GeoError::NoLocation)?;
        let longitude = location.longitude.ok_or(GeoError::NoLocation)?;

        Ok(Coordinates {
            latitude,
            longitude,
        })
    }

    /// Get the city record for an IP address
    ///
    /// Partial records are fine: any missing part is left as `None`.
    pub fn lookup_city_info(&self, ip: &IpAddr) -> Result<CityInfo, GeoError> {
        let city = self.lookup_city(ip)?;

        let coordinates = city.location.as_ref().and_then(|l| match (l.latitude, l.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
            _ => None,
        });

        Ok(CityInfo {
            city_name: city
                .city
                .and_then(|c| c.names)
                .and_then(|n| n.get("en").copied())
                .map(String::from),
            country_name: city
                .country
                .as_ref()
                .and_then(|c| c.names.as_ref())
                .and_then(|n| n.get("en").copied())
                .map(String::from),
            country_code: city.country.and_then(|c| c.iso_code).map(String::from),
            coordinates,
            timezone: city.location.and_then(|l| l.time_zone).map(String::from),
        })
    }
}

impl GeoResolver for GeoIpService {
    fn resolve(&self, ip: &IpAddr) -> Option<Location> {
        match self.lookup_city_info(ip) {
            Ok(info) => Some(info.into_location()),
            Err(GeoError::NotFound) | Err(GeoError::NoLocation) => None,
            Err(e) => {
                log::warn!("GeoIP lookup for {} failed: {}", ip, e);
                None
            }
        }
    }
}

impl Clone for GeoIpService {
    fn clone(&self) -> Self {
        GeoIpService {
            reader: Arc::clone(&self.reader),
        }
    }
}

/// City information from the GeoIP database
#[derive(Debug, Clone)]
pub struct CityInfo {
    /// City name in English
    pub city_name: Option<String>,
    /// Country name in English
    pub country_name: Option<String>,
    /// ISO 3166-1 alpha-2 country code
    pub country_code: Option<String>,
    pub coordinates: Option<Coordinates>,
    /// Timezone identifier (e.g., "America/New_York")
    pub timezone: Option<String>,
}

impl CityInfo {
    /// Country is recorded as the ISO code when present, so it compares
    /// stably across database releases
    pub fn into_location(self) -> Location {
        Location {
            country: self.country_code.or(self.country_name),
            city: self.city_name,
            coordinates: self.coordinates,
        }
    }
}

/// Fixed IP-to-location table, for fixtures and offline replays
#[derive(Debug, Clone, Default)]
pub struct StaticGeoResolver {
    entries: HashMap<IpAddr, Location>,
}

impl StaticGeoResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, ip: IpAddr, location: Location) -> Self {
        self.entries.insert(ip, location);
        self
    }
}

impl GeoResolver for StaticGeoResolver {
    fn resolve(&self, ip: &IpAddr) -> Option<Location> {
        self.entries.get(ip).cloned()
    }
}
