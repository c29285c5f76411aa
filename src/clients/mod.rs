//! Outbound collaborators: payment gateway, POS lookup, message broker and
//! push notifications. Each is a trait so the core can be driven by mocks.

pub mod broker;
pub mod gateway;
pub mod notifier;
pub mod pos;

pub use broker::{Broker, BrokerError, RedisBroker};
pub use gateway::{GatewayError, GatewayInvoice, InvoiceRequest, PaymentGateway, XenditGateway};
pub use notifier::{Notifier, NotifierError, OneSignalNotifier, PushMessage};
pub use pos::{HttpPosClient, InvoiceDetail, LineItem, PosClient, PosError};
