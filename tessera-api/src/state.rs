use anyhow::Context;
use chrono::Duration;
use std::sync::Arc;

use tessera_core::events::EventPublisher;
use tessera_core::payment::PaymentGateway;
use tessera_core::repository::{
    InquiryRepository, IntentRepository, OfferingRepository, TicketRepository,
};
use tessera_intake::InquiryIntake;
use tessera_order::{BookingDeps, BookingOrchestrator, MockPaymentGateway};
use tessera_store::app_config::{BusinessRules, Config, GatewayMode, StoreBackend};
use tessera_store::{
    event_producer, DbClient, HttpPaymentGateway, MemoryStore, PgInquiryRepository,
    PgIntentRepository, PgOfferingRepository, PgTicketRepository, RedisClient,
};

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub booking: Arc<BookingOrchestrator>,
    pub intake: Arc<InquiryIntake>,
    /// Rate limiting is skipped when Redis is not configured.
    pub redis: Option<Arc<RedisClient>>,
    pub metrics: Arc<Metrics>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

/// The datastore seams, one handle per aggregate.
pub struct Repositories {
    pub offerings: Arc<dyn OfferingRepository>,
    pub intents: Arc<dyn IntentRepository>,
    pub tickets: Arc<dyn TicketRepository>,
    pub inquiries: Arc<dyn InquiryRepository>,
}

impl Repositories {
    pub fn memory(store: &MemoryStore) -> Self {
        Self {
            offerings: Arc::new(store.clone()),
            intents: Arc::new(store.clone()),
            tickets: Arc::new(store.clone()),
            inquiries: Arc::new(store.clone()),
        }
    }

    pub fn postgres(db: &DbClient) -> Self {
        Self {
            offerings: Arc::new(PgOfferingRepository::new(db.pool.clone())),
            intents: Arc::new(PgIntentRepository::new(db.pool.clone())),
            tickets: Arc::new(PgTicketRepository::new(db.pool.clone())),
            inquiries: Arc::new(PgInquiryRepository::new(db.pool.clone())),
        }
    }
}

pub struct StateParts {
    pub repositories: Repositories,
    pub gateway: Arc<dyn PaymentGateway>,
    pub events: Arc<dyn EventPublisher>,
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
    pub webhook_secret: String,
    pub business_rules: BusinessRules,
}

impl AppState {
    pub fn new(parts: StateParts) -> anyhow::Result<Self> {
        let rules = parts.business_rules;
        let hold_ttl = Duration::seconds(i64::try_from(rules.hold_ttl_seconds).context("hold_ttl_seconds out of range")?);

        let booking = BookingOrchestrator::new(BookingDeps {
            offerings: parts.repositories.offerings,
            intents: parts.repositories.intents,
            tickets: parts.repositories.tickets,
            gateway: parts.gateway,
            events: parts.events.clone(),
            webhook_secret: parts.webhook_secret.into_bytes(),
            hold_ttl,
            max_seats_per_reservation: rules.max_seats_per_reservation,
        });
        let intake = InquiryIntake::new(
            parts.repositories.inquiries,
            parts.events,
            rules.phone_significant_digits,
        );

        Ok(Self {
            booking: Arc::new(booking),
            intake: Arc::new(intake),
            redis: parts.redis,
            metrics: Arc::new(Metrics::new()?),
            auth: parts.auth,
            business_rules: rules,
        })
    }

    /// Wires the configured backends: datastore, gateway, event sink, Redis.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let repositories = match config.store.backend {
            StoreBackend::Memory => {
                tracing::warn!("Using the in-memory datastore; nothing survives a restart");
                Repositories::memory(&MemoryStore::new())
            }
            StoreBackend::Postgres => {
                let db_config = config
                    .database
                    .as_ref()
                    .context("[database] is required for the postgres backend")?;
                let db = DbClient::new(&db_config.url, db_config.max_connections)
                    .await
                    .context("Failed to connect to Postgres")?;
                db.migrate().await.context("Failed to run migrations")?;
                Repositories::postgres(&db)
            }
        };

        let gateway: Arc<dyn PaymentGateway> = match config.gateway.mode {
            GatewayMode::Http => Arc::new(HttpPaymentGateway::new(&config.gateway)?),
            GatewayMode::Mock => {
                tracing::warn!("Using the mock payment gateway");
                Arc::new(MockPaymentGateway::new())
            }
        };

        let events = event_producer(config.kafka.as_ref().map(|k| k.brokers.as_str()))?;

        let redis = match &config.redis {
            Some(redis) => match RedisClient::new(&redis.url).await {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    tracing::warn!("Redis unavailable, rate limiting disabled: {}", e);
                    None
                }
            },
            None => None,
        };

        Self::new(StateParts {
            repositories,
            gateway,
            events,
            redis,
            auth: AuthConfig {
                secret: config.auth.jwt_secret.clone(),
            },
            webhook_secret: config.gateway.webhook_secret.clone(),
            business_rules: config.business_rules.clone(),
        })
    }
}
