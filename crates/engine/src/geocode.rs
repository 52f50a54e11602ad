//! Geocodificação reversa (coordenada → endereço legível).

use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use tracker_core::alerts::ADDRESS_UNKNOWN;
use tracker_core::config::GeocoderConfig;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("Erro HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Nenhum endereço para a coordenada")]
    NotFound,
}

/// `resolveAddress(lat, lon) -> endereço | falha`. O timeout é do backend.
pub trait Geocoder: Send + Sync {
    fn resolve_address(&self, latitude: f64, longitude: f64) -> Result<String, GeocodeError>;
}

/// Resposta do endpoint `/reverse` do Nominatim.
#[derive(Debug, Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
}

pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl Geocoder for NominatimGeocoder {
    fn resolve_address(&self, latitude: f64, longitude: f64) -> Result<String, GeocodeError> {
        let response: ReverseResponse = self
            .client
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
            ])
            .send()?
            .error_for_status()?
            .json()?;

        response
            .display_name
            .filter(|name| !name.trim().is_empty())
            .map(|name| name.replace('\n', ", "))
            .ok_or(GeocodeError::NotFound)
    }
}

/// Endereço para o alerta; falha, timeout ou geocoder desligado viram
/// [`ADDRESS_UNKNOWN`].
pub fn address_or_placeholder(geocoder: Option<&dyn Geocoder>, latitude: f64, longitude: f64) -> String {
    let Some(geocoder) = geocoder else {
        return ADDRESS_UNKNOWN.to_string();
    };
    match geocoder.resolve_address(latitude, longitude) {
        Ok(address) => address,
        Err(e) => {
            debug!("Geocodificação falhou para ({latitude}, {longitude}): {e}");
            ADDRESS_UNKNOWN.to_string()
        }
    }
}
