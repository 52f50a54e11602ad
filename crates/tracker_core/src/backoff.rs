//! Política de reconexão com backoff exponencial limitado.

use std::time::Duration;

/// Menor espera entre tentativas.
pub const BACKOFF_MIN: Duration = Duration::from_secs(1);

/// Maior espera entre tentativas.
pub const BACKOFF_MAX: Duration = Duration::from_secs(15);

/// Dobra a espera a cada falha consecutiva, entre `min` e `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    next: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BACKOFF_MIN, BACKOFF_MAX)
    }
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            next: min,
        }
    }

    /// Espera antes da próxima tentativa; avança a sequência.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    /// Conexão bem-sucedida: volta ao mínimo.
    pub fn reset(&mut self) {
        self.next = self.min;
    }
}
