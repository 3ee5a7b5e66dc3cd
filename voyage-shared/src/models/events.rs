use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingCreatedEvent {
    pub booking_id: Uuid,
    pub package_id: Uuid,
    pub buyer_id: String,
    pub persons: u32,
    pub total_price: i64,
    pub travel_date: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingCancelledEvent {
    pub booking_id: Uuid,
    pub buyer_id: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingDeletedEvent {
    pub booking_id: Uuid,
    pub buyer_id: String,
    pub timestamp: i64,
}

/// Topic names used when publishing booking lifecycle events.
pub mod topics {
    pub const BOOKING_CREATED: &str = "booking.created";
    pub const BOOKING_CANCELLED: &str = "booking.cancelled";
    pub const BOOKING_DELETED: &str = "booking.deleted";
}
