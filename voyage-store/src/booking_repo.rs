use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use voyage_catalog::Package;
use voyage_core::repository::{BookingFilter, BookingRepository, PackageRepository};
use voyage_core::{Booking, BookingRecord, BuyerProfile, Payment, StoreError};

/// Postgres-backed catalog reads and booking/payment persistence.
pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct PackageRow {
    id: Uuid,
    name: String,
    destination: String,
    price: i64,
    discount_price: Option<i64>,
    rating: f64,
    total_ratings: i32,
    images: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<PackageRow> for Package {
    fn from(row: PackageRow) -> Self {
        Package {
            id: row.id,
            name: row.name,
            destination: row.destination,
            price: row.price,
            discount_price: row.discount_price,
            rating: row.rating,
            total_ratings: row.total_ratings,
            images: row.images,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    package_id: Uuid,
    buyer_id: String,
    travel_date: DateTime<Utc>,
    persons: i32,
    total_price: i64,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            package_id: row.package_id,
            buyer_id: row.buyer_id,
            date: row.travel_date,
            persons: u32::try_from(row.persons)?,
            total_price: row.total_price,
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    card_token: String,
    card_last_four: String,
    expiry_date: String,
    name_on_card: String,
    amount: i64,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            booking_id: row.booking_id,
            card_token: row.card_token,
            card_last_four: row.card_last_four,
            expiry_date: row.expiry_date,
            name_on_card: row.name_on_card,
            amount: row.amount,
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

/// One row of the bookings x packages x users left join.
#[derive(sqlx::FromRow)]
struct BookingJoinRow {
    #[sqlx(flatten)]
    booking: BookingRow,
    p_id: Option<Uuid>,
    p_name: Option<String>,
    p_destination: Option<String>,
    p_price: Option<i64>,
    p_discount_price: Option<i64>,
    p_rating: Option<f64>,
    p_total_ratings: Option<i32>,
    p_images: Option<Vec<String>>,
    p_created_at: Option<DateTime<Utc>>,
    u_id: Option<String>,
    u_username: Option<String>,
    u_email: Option<String>,
}

impl TryFrom<BookingJoinRow> for BookingRecord {
    type Error = StoreError;

    fn try_from(row: BookingJoinRow) -> Result<Self, Self::Error> {
        let package = match (row.p_id, row.p_name, row.p_destination, row.p_price, row.p_created_at) {
            (Some(id), Some(name), Some(destination), Some(price), Some(created_at)) => Some(Package {
                id,
                name,
                destination,
                price,
                discount_price: row.p_discount_price,
                rating: row.p_rating.unwrap_or_default(),
                total_ratings: row.p_total_ratings.unwrap_or_default(),
                images: row.p_images.unwrap_or_default(),
                created_at,
            }),
            _ => None,
        };

        let buyer = match (row.u_id, row.u_username, row.u_email) {
            (Some(id), Some(username), Some(email)) => Some(BuyerProfile { id, username, email }),
            _ => None,
        };

        Ok(BookingRecord {
            booking: row.booking.try_into()?,
            package,
            buyer,
        })
    }
}

const BOOKING_COLUMNS: &str =
    "id, package_id, buyer_id, travel_date, persons, total_price, status, created_at";

#[async_trait]
impl PackageRepository for PgBookingRepository {
    async fn get_package(
        &self,
        id: Uuid,
    ) -> Result<Option<Package>, StoreError> {
        let row = sqlx::query_as::<_, PackageRow>(
            "SELECT id, name, destination, price, discount_price, rating, total_ratings, images, created_at FROM packages WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Package::from))
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert_with_payment(
        &self,
        booking: &Booking,
        payment: &Payment,
    ) -> Result<(), StoreError> {
        // Both rows commit together; dropping `tx` on error rolls back.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO bookings (id, package_id, buyer_id, travel_date, persons, total_price, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(booking.id)
        .bind(booking.package_id)
        .bind(&booking.buyer_id)
        .bind(booking.date)
        .bind(i32::try_from(booking.persons)?)
        .bind(booking.total_price)
        .bind(booking.status.to_string())
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO payments (id, booking_id, card_token, card_last_four, expiry_date, name_on_card, amount, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(payment.id)
        .bind(payment.booking_id)
        .bind(&payment.card_token)
        .bind(&payment.card_last_four)
        .bind(&payment.expiry_date)
        .bind(&payment.name_on_card)
        .bind(payment.amount)
        .bind(payment.status.to_string())
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_booking(
        &self,
        id: Uuid,
    ) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Booking::try_from).transpose()
    }

    async fn get_payment_for_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            "SELECT id, booking_id, card_token, card_last_four, expiry_date, name_on_card, amount, status, created_at FROM payments WHERE booking_id = $1",
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Payment::try_from).transpose()
    }

    async fn list_bookings(
        &self,
        filter: &BookingFilter,
    ) -> Result<Vec<BookingRecord>, StoreError> {
        let rows = sqlx::query_as::<_, BookingJoinRow>(
            r#"
            SELECT b.id, b.package_id, b.buyer_id, b.travel_date, b.persons, b.total_price, b.status, b.created_at,
                   p.id AS p_id, p.name AS p_name, p.destination AS p_destination, p.price AS p_price,
                   p.discount_price AS p_discount_price, p.rating AS p_rating, p.total_ratings AS p_total_ratings,
                   p.images AS p_images, p.created_at AS p_created_at,
                   u.id AS u_id, u.username AS u_username, u.email AS u_email
            FROM bookings b
            LEFT JOIN packages p ON p.id = b.package_id
            LEFT JOIN users u ON u.id = b.buyer_id
            WHERE ($1::TEXT IS NULL OR b.buyer_id = $1)
              AND ($2::TIMESTAMPTZ IS NULL OR (b.status = 'Booked' AND b.travel_date > $2))
            ORDER BY b.created_at ASC
            "#,
        )
        .bind(filter.buyer_id.as_deref())
        .bind(filter.current_as_of)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BookingRecord::try_from).collect()
    }

    async fn cancel_booking(
        &self,
        id: Uuid,
    ) -> Result<Option<Booking>, StoreError> {
        // Conditional update: concurrent cancels resolve to exactly one winner.
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE bookings SET status = 'Cancelled', updated_at = NOW() WHERE id = $1 AND status = 'Booked' RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Booking::try_from).transpose()
    }

    async fn delete_booking(
        &self,
        id: Uuid,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM payments WHERE booking_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
