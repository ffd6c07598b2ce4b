pub mod config;
pub mod contracts;
pub mod db;

pub use config::ServiceConfig;
pub use contracts::{
    AddOwnerRequest, AsOfQuery, BulkCreateRequest, BulkCreateResponse, BulkSummary,
    BulkUnitInput, ChargeDetail, ChargeItemInput, ChargeListQuery, ChargeTrail, ClientSummary,
    CreateChargeRequest, CreateClientRequest, CreateParameterRequest, CreatePersonRequest,
    CreateProgressRequest, CreateUnitRequest, FeeOverrideRequest, HealthResponse,
    InboundWhatsAppMessage, IndexValueRequest, Listing, NegotiateRequest, PageQuery, PageWindow,
    Paged, PaymentRequest, RegisterDocumentRequest, SkippedUnit, TimelineResponse,
    TimelineSummary, UnitChargeStatus, UnitHistoryResponse, UnitStatistics, UnitWithOwners,
    UpsertIndexRequest, WebhookOutcome, WhatsAppWebhook, success_rate,
};
pub use db::{connect_database, ensure_schema};
