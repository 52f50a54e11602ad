//! Alertas – tipos e texto enviado ao contato de emergência.

use serde::{Deserialize, Serialize};

/// Texto usado quando a geocodificação reversa falha ou expira.
pub const ADDRESS_UNKNOWN: &str = "Endereço desconhecido";

/// Motivo do alerta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    /// Botão SOS pressionado
    Sos,
    /// Dispositivo saiu da geofence
    Danger,
    /// Silêncio acima do limite
    Offline,
}

impl AlertKind {
    fn headline(self) -> &'static str {
        match self {
            AlertKind::Sos => "🚨 BOTÃO SOS PRESSIONADO!",
            AlertKind::Danger => "🚨 PERIGO: dispositivo fora da zona segura!",
            AlertKind::Offline => "🚨 ALERTA: dispositivo sem conexão há mais de 10 minutos!",
        }
    }
}

/// Dados de posição anexados a um alerta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub battery_percent: u8,
}

/// Um alerta pronto para ser formatado.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub kind: AlertKind,
    /// `None` para OFFLINE (não há posição nova)
    pub location: Option<AlertLocation>,
}

impl Alert {
    pub fn offline() -> Self {
        Self {
            kind: AlertKind::Offline,
            location: None,
        }
    }
}

/// Link do Google Maps para a coordenada.
pub fn map_link(latitude: f64, longitude: f64) -> String {
    format!("https://maps.google.com/?q={latitude},{longitude}")
}

/// Monta o texto do alerta. `address` é o resultado da geocodificação
/// (ou [`ADDRESS_UNKNOWN`]).
pub fn format_alert(alert: &Alert, address: &str) -> String {
    match alert.location {
        Some(loc) => format!(
            "{}\n🔋 Bateria: {}%\n📍 {}\n{}",
            alert.kind.headline(),
            loc.battery_percent,
            address,
            map_link(loc.latitude, loc.longitude)
        ),
        None => alert.kind.headline().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn located(kind: AlertKind) -> Alert {
        Alert {
            kind,
            location: Some(AlertLocation {
                latitude: 18.69,
                longitude: 105.69,
                battery_percent: 10,
            }),
        }
    }

    #[test]
    fn sos_message_has_battery_address_and_link() {
        let text = format_alert(&located(AlertKind::Sos), "Vinh, Nghe An");
        assert!(text.starts_with("🚨 BOTÃO SOS"));
        assert!(text.contains("Bateria: 10%"));
        assert!(text.contains("📍 Vinh, Nghe An"));
        assert!(text.ends_with("https://maps.google.com/?q=18.69,105.69"));
    }

    #[test]
    fn danger_message_with_placeholder_address() {
        let text = format_alert(&located(AlertKind::Danger), ADDRESS_UNKNOWN);
        assert!(text.contains("PERIGO"));
        assert!(text.contains(ADDRESS_UNKNOWN));
    }

    #[test]
    fn offline_message_is_headline_only() {
        let text = format_alert(&Alert::offline(), ADDRESS_UNKNOWN);
        assert!(text.contains("10 minutos"));
        assert!(!text.contains("maps.google.com"));
    }
}
