pub mod app_config;
pub mod database;
pub mod events;
pub mod gateway_client;
pub mod inquiry_repo;
pub mod intent_repo;
pub mod memory;
pub mod offering_repo;
pub mod redis_repo;
pub mod ticket_repo;

pub use database::DbClient;
pub use events::{event_producer, LogEventProducer};
pub use gateway_client::HttpPaymentGateway;
pub use inquiry_repo::PgInquiryRepository;
pub use intent_repo::PgIntentRepository;
pub use memory::MemoryStore;
pub use offering_repo::PgOfferingRepository;
pub use redis_repo::RedisClient;
pub use ticket_repo::PgTicketRepository;
