//! Listener geolocation backed by a GeoIP2/GeoLite2 City database.
//!
//! The resolver owns the database handle across poll cycles. The database file
//! is replaced in place by tools like geoipupdate, so the handle is reopened
//! once the file's modification time has changed and the change has settled.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
use crate::errors::GeoError;
use maxminddb::{
    geoip2,
    MaxMindDBError,
    Reader,
};
use std::collections::BTreeMap;
use std::fs;
use std::net::IpAddr;
use std::path::{
    Path,
    PathBuf,
};
use std::time::{
    Duration,
    SystemTime,
};
use tracing::{
    debug,
    info,
};

/// How long a changed database file must remain untouched before we reopen
/// it.
pub const REOPEN_GRACE: Duration = Duration::from_secs(5 * 60);

/// City level geolocation of an address.
///
/// Names are localized in the resolver's language and are empty when no
/// language is configured or the database has no name in that language.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeoLocation {
    /// Two letter continent code, eg. `EU`.
    pub continent_code: String,

    /// Localized continent name.
    pub continent_name: String,

    /// ISO 3166-1 country code, eg. `DE`.
    pub country_code: String,

    /// Localized country name.
    pub country_name: String,

    /// Localized city name.
    pub city_name: String,

    /// Postal code.
    pub postal_code: String,

    /// Approximate latitude.
    pub latitude: f64,

    /// Approximate longitude.
    pub longitude: f64,
}

/// Resolves listener addresses to locations.
pub trait GeoLookup {
    /// Resolves an address given in string form.
    fn resolve(&self, ip: &str) -> Result<GeoLocation, GeoError>;
}

/// A geolocation database that can be opened from a file.
pub trait GeoDatabase: Sized {
    /// Opens the database at the given path.
    fn open(path: &Path) -> Result<Self, GeoError>;

    /// Looks up the city level record for an address.
    fn city(
        &self,
        ip: IpAddr,
        language: Option<&str>,
    ) -> Result<GeoLocation, GeoError>;
}

/// A MaxMind DB format city database.
pub struct MaxMindDatabase {
    reader: Reader<Vec<u8>>,
}

impl GeoDatabase for MaxMindDatabase {
    fn open(path: &Path) -> Result<Self, GeoError> {
        debug!("Opening geolocation database: {}", path.display());

        let reader = Reader::open_readfile(path).map_err(|source| {
            GeoError::Open {
                path: path.to_path_buf(),
                source,
            }
        })?;

        Ok(Self {
            reader,
        })
    }

    fn city(
        &self,
        ip: IpAddr,
        language: Option<&str>,
    ) -> Result<GeoLocation, GeoError> {
        let city: geoip2::City = match self.reader.lookup(ip) {
            Ok(city) => city,
            Err(MaxMindDBError::AddressNotFoundError(_)) => {
                return Err(GeoError::NotFound(ip));
            },
            Err(source) => {
                return Err(GeoError::Lookup {
                    ip,
                    source,
                });
            },
        };

        let continent = city.continent.as_ref();
        let country   = city.country.as_ref();
        let coords    = city.location.as_ref();

        let location = GeoLocation {
            continent_code: continent
                .and_then(|c| c.code)
                .unwrap_or_default()
                .to_string(),
            continent_name: localized(
                continent.and_then(|c| c.names.as_ref()),
                language,
            ),
            country_code: country
                .and_then(|c| c.iso_code)
                .unwrap_or_default()
                .to_string(),
            country_name: localized(
                country.and_then(|c| c.names.as_ref()),
                language,
            ),
            city_name: localized(
                city.city.as_ref().and_then(|c| c.names.as_ref()),
                language,
            ),
            postal_code: city.postal
                .as_ref()
                .and_then(|p| p.code)
                .unwrap_or_default()
                .to_string(),
            latitude: coords
                .and_then(|l| l.latitude)
                .unwrap_or_default(),
            longitude: coords
                .and_then(|l| l.longitude)
                .unwrap_or_default(),
        };

        Ok(location)
    }
}

// Picks the name in the given language, empty if there isn't one.
fn localized(
    names: Option<&BTreeMap<&str, &str>>,
    language: Option<&str>,
) -> String {
    match (names, language) {
        (Some(names), Some(language)) => {
            names.get(language).map(|n| n.to_string()).unwrap_or_default()
        },
        _ => String::new(),
    }
}

/// Decides whether a database whose file was last seen with modification
/// time `last` should be reopened now that the file reports `current`.
///
/// The file must have changed, and the change must be older than
/// `REOPEN_GRACE`, so a file that is still being written is left alone.
pub fn should_reopen(
    last: SystemTime,
    current: SystemTime,
    now: SystemTime,
) -> bool {
    if current == last {
        return false;
    }

    match current.checked_add(REOPEN_GRACE) {
        Some(settled) => settled < now,
        None          => false,
    }
}

enum GeoState<D> {
    Closed,
    Open {
        database: D,
        modified: SystemTime,
    },
}

/// Owns the geolocation database handle.
///
/// The resolver is either closed or open on a specific file, remembering the
/// file's modification time at open. It is not internally synchronised; the
/// owning collector must not be gathered from concurrently.
pub struct GeoResolver<D = MaxMindDatabase> {
    path:     Option<PathBuf>,
    language: Option<String>,
    state:    GeoState<D>,
}

impl<D: GeoDatabase> GeoResolver<D> {
    /// Returns a closed resolver. A `None` path disables geolocation.
    pub fn new(path: Option<PathBuf>, language: Option<String>) -> Self {
        Self {
            path,
            language,
            state: GeoState::Closed,
        }
    }

    /// Whether a database handle is currently open.
    pub fn is_open(&self) -> bool {
        matches!(self.state, GeoState::Open { .. })
    }

    /// The language used for localized names, if any.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Opens the database if it isn't open yet, or reopens it if the file
    /// changed more than `REOPEN_GRACE` ago. Does nothing when no path is
    /// configured.
    pub fn ensure_open(&mut self) -> Result<(), GeoError> {
        self.ensure_open_at(SystemTime::now())
    }

    fn ensure_open_at(&mut self, now: SystemTime) -> Result<(), GeoError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };

        let modified = fs::metadata(&path)
            .and_then(|metadata| metadata.modified())
            .map_err(|source| {
                GeoError::Stat {
                    path: path.clone(),
                    source,
                }
            })?;

        if let GeoState::Open { modified: last, .. } = &self.state {
            if !should_reopen(*last, modified, now) {
                return Ok(());
            }

            info!("Geolocation database changed, reopening: {}", path.display());
            self.close();
        }

        let database = D::open(&path)?;

        self.state = GeoState::Open {
            database,
            modified,
        };

        Ok(())
    }

    /// Drops the database handle.
    pub fn close(&mut self) {
        if self.is_open() {
            debug!("Closing geolocation database");
        }

        self.state = GeoState::Closed;
    }
}

impl<D: GeoDatabase> GeoLookup for GeoResolver<D> {
    fn resolve(&self, ip: &str) -> Result<GeoLocation, GeoError> {
        let addr: IpAddr = ip
            .parse()
            .map_err(|_| GeoError::InvalidAddress(ip.to_string()))?;

        match &self.state {
            GeoState::Open { database, .. } => {
                database.city(addr, self.language())
            },
            GeoState::Closed => Err(GeoError::NotOpen),
        }
    }
}
