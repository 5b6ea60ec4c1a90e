use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Service counters, rendered at `GET /metrics`.
pub struct Metrics {
    registry: Registry,
    pub reservations: IntCounterVec,
    pub confirmations: IntCounterVec,
    pub checkins: IntCounterVec,
    pub inquiries: IntCounterVec,
    pub holds_expired: IntCounter,
}

fn outcome_counter(
    registry: &Registry,
    name: &str,
    help: &str,
) -> Result<IntCounterVec, prometheus::Error> {
    let counter = IntCounterVec::new(Opts::new(name, help), &["outcome"])?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("tessera".to_string()), None)?;

        let reservations = outcome_counter(&registry, "reservations_total", "Reservation attempts by outcome")?;
        let confirmations = outcome_counter(&registry, "payment_confirmations_total", "Payment callbacks by outcome")?;
        let checkins = outcome_counter(&registry, "checkins_total", "Ticket scans by outcome")?;
        let inquiries = outcome_counter(&registry, "inquiries_total", "Contact submissions, created or merged")?;

        let holds_expired = IntCounter::new("holds_expired_total", "Pending reservations reclaimed by the sweep")?;
        registry.register(Box::new(holds_expired.clone()))?;

        Ok(Self {
            registry,
            reservations,
            confirmations,
            checkins,
            inquiries,
            holds_expired,
        })
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_prefixed_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.reservations.with_label_values(&["created"]).inc();
        metrics.holds_expired.inc_by(3);

        let text = metrics.render().unwrap();
        assert!(text.contains("tessera_reservations_total{outcome=\"created\"} 1"));
        assert!(text.contains("tessera_holds_expired_total 3"));
    }
}
