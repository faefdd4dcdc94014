//! Postgres-backed tests for the seat occupancy guards: the (trip, seat)
//! unique index, trip row locks, and the RESTRICT key on seats.
//!
//! Each test gets a fresh database from `#[sqlx::test]` (needs `DATABASE_URL`).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use transit_core::models::{
    CreateBusType, CreateReservation, GenerateGrid, NewReservation, NewTrip, ReservationChanges, Seat, Trip,
    TripPatch,
};
use transit_core::{
    CoreError, ReservationController, ReservationLedger, SeatTemplateRepository, SeatTemplateStore, StoreError,
    TripRegistry, TripRepository,
};
use transit_shared::TripId;
use transit_store::{PgReservationLedger, PgSeatTemplateRepository, PgTripRepository};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Repos {
    templates: Arc<PgSeatTemplateRepository>,
    trips: Arc<PgTripRepository>,
    ledger: Arc<PgReservationLedger>,
}

fn repos(pool: &PgPool) -> Repos {
    Repos {
        templates: Arc::new(PgSeatTemplateRepository::new(pool.clone())),
        trips: Arc::new(PgTripRepository::new(pool.clone())),
        ledger: Arc::new(PgReservationLedger::new(pool.clone())),
    }
}

async fn bus_with_grid(r: &Repos, name: &str, rows: u32, cols: u32) -> Vec<Seat> {
    let store = SeatTemplateStore::new(r.templates.clone());
    let bt = store
        .create_bus_type(CreateBusType { name: Some(name.into()), seat_count: Some((rows * cols) as i32) })
        .await
        .unwrap();
    store
        .generate_grid(bt.id, GenerateGrid { rows: Some(rows), cols: Some(cols) })
        .await
        .unwrap();
    store.list_seats(bt.id).await.unwrap()
}

async fn trip(r: &Repos, bus_type_id: i32) -> Trip {
    r.trips
        .insert(&NewTrip {
            bus_type_id,
            departure_dt: Utc::now(),
            origin_label: "Damascus".into(),
            destination_label: "Aleppo".into(),
            duration_minutes: Some(300),
            driver_name: None,
            status: "scheduled".into(),
            created_by: 1,
        })
        .await
        .unwrap()
}

fn seated(trip_id: TripId, seat_id: i32, name: &str) -> NewReservation {
    NewReservation {
        trip_id,
        seat_id: Some(seat_id),
        passenger_name: name.into(),
        phone: None,
        boarding_point: Some("Damascus".into()),
        notes: None,
        paid: false,
        amount: 0,
        created_by: 1,
    }
}

async fn commit_reservation(r: &Repos, new: NewReservation) -> transit_core::models::Reservation {
    let mut tx = r.ledger.begin().await.unwrap();
    let reservation = tx.insert(&new).await.unwrap();
    tx.commit().await.unwrap();
    reservation
}

// ---------------------------------------------------------------------------
// Unique index on (trip, seat)
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../migrations")]
async fn concurrent_inserts_on_same_seat_leave_one_winner(pool: PgPool) {
    let r = repos(&pool);
    let seats = bus_with_grid(&r, "Coach", 1, 2).await;
    let trip = trip(&r, seats[0].bus_type_id).await;

    let mut first = r.ledger.begin().await.unwrap();
    let mut second = r.ledger.begin().await.unwrap();

    // Both transactions see the seat as free before either writes.
    assert!(first.find_by_trip_and_seat(trip.id, seats[0].id).await.unwrap().is_none());
    assert!(second.find_by_trip_and_seat(trip.id, seats[0].id).await.unwrap().is_none());

    first.insert(&seated(trip.id, seats[0].id, "Ahmad")).await.unwrap();

    // The second insert waits on the index entry until the first commits.
    let loser = tokio::spawn({
        let new = seated(trip.id, seats[0].id, "Rana");
        async move { second.insert(&new).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    first.commit().await.unwrap();

    let err = loser.await.unwrap().unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)), "got {:?}", err);

    let held = r.ledger.list_by_trip(trip.id).await.unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].passenger_name, "Ahmad");
}

#[sqlx::test(migrations = "../migrations")]
async fn concurrent_bookings_through_controller_yield_one_winner(pool: PgPool) {
    let r = repos(&pool);
    let seats = bus_with_grid(&r, "Coach", 1, 1).await;
    let trip = trip(&r, seats[0].bus_type_id).await;
    let controller = ReservationController::new(r.trips.clone(), r.templates.clone(), r.ledger.clone());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let controller = controller.clone();
            let req = CreateReservation {
                trip_id: Some(trip.id),
                seat_id: Some(seats[0].id),
                passenger_name: Some(format!("Passenger {}", i)),
                boarding_point: Some("Damascus".into()),
                ..Default::default()
            };
            tokio::spawn(async move { controller.create(req, 1).await })
        })
        .collect();

    let mut won = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(CoreError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!((won, conflicts), (1, 3));
    assert_eq!(r.ledger.list_by_trip(trip.id).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../migrations")]
async fn moving_onto_taken_seat_is_refused_by_index(pool: PgPool) {
    let r = repos(&pool);
    let seats = bus_with_grid(&r, "Coach", 1, 2).await;
    let trip = trip(&r, seats[0].bus_type_id).await;

    let a = commit_reservation(&r, seated(trip.id, seats[0].id, "Ahmad")).await;
    commit_reservation(&r, seated(trip.id, seats[1].id, "Rana")).await;

    let mut tx = r.ledger.begin().await.unwrap();
    let changes = ReservationChanges { seat_id: Some(seats[1].id), ..Default::default() };
    let err = tx.update(a.id, &changes).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)), "got {:?}", err);
    drop(tx);

    let unchanged = r.ledger.get(a.id).await.unwrap().unwrap();
    assert_eq!(unchanged.seat_id, Some(seats[0].id));
}

#[sqlx::test(migrations = "../migrations")]
async fn unseated_passengers_do_not_collide(pool: PgPool) {
    let r = repos(&pool);
    let seats = bus_with_grid(&r, "Coach", 1, 1).await;
    let trip = trip(&r, seats[0].bus_type_id).await;

    for name in ["Walk-in 1", "Walk-in 2"] {
        let mut new = seated(trip.id, seats[0].id, name);
        new.seat_id = None;
        commit_reservation(&r, new).await;
    }
    assert_eq!(r.ledger.list_by_trip(trip.id).await.unwrap().len(), 2);
}

#[sqlx::test(migrations = "../migrations")]
async fn insert_for_unknown_trip_is_a_missing_reference(pool: PgPool) {
    let r = repos(&pool);
    let seats = bus_with_grid(&r, "Coach", 1, 1).await;

    let mut tx = r.ledger.begin().await.unwrap();
    let err = tx.insert(&seated(TripId(424_242), seats[0].id, "Ghost")).await.unwrap_err();
    assert!(matches!(err, StoreError::MissingReference(_)), "got {:?}", err);
}

// ---------------------------------------------------------------------------
// Seat grid regeneration
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../migrations")]
async fn replace_seats_refused_while_a_seat_is_referenced(pool: PgPool) {
    let r = repos(&pool);
    let seats = bus_with_grid(&r, "Coach", 2, 2).await;
    let bus_type_id = seats[0].bus_type_id;
    let trip = trip(&r, bus_type_id).await;
    commit_reservation(&r, seated(trip.id, seats[3].id, "Ahmad")).await;

    // Skips the linked-reservation count to hit the foreign key directly.
    let mut tx = r.templates.begin().await.unwrap();
    tx.lock_bus_type(bus_type_id).await.unwrap().unwrap();
    let err = tx.replace_seats(bus_type_id, &[(1, 1)]).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)), "got {:?}", err);
    drop(tx);

    assert_eq!(r.templates.list_seats(bus_type_id).await.unwrap(), seats);

    let store = SeatTemplateStore::new(r.templates.clone());
    let err = store
        .generate_grid(bus_type_id, GenerateGrid { rows: Some(3), cols: Some(3) })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
}

// ---------------------------------------------------------------------------
// Trip row locks
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../migrations")]
async fn rebinding_waits_for_inflight_booking(pool: PgPool) {
    let r = repos(&pool);
    let seats = bus_with_grid(&r, "Coach", 1, 2).await;
    let other = bus_with_grid(&r, "Mini", 1, 1).await;
    let trip = trip(&r, seats[0].bus_type_id).await;
    let registry = TripRegistry::new(r.trips.clone(), r.templates.clone());

    // Booking holds FOR SHARE on the trip with an uncommitted reservation.
    let mut booking = r.ledger.begin().await.unwrap();
    booking.lock_trip(trip.id).await.unwrap().unwrap();
    booking.insert(&seated(trip.id, seats[0].id, "Ahmad")).await.unwrap();

    let rebind = tokio::spawn({
        let registry = registry.clone();
        let trip_id = trip.id;
        let patch = TripPatch { bus_type_id: Some(other[0].bus_type_id), ..Default::default() };
        async move { registry.patch(trip_id, patch).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!rebind.is_finished());
    booking.commit().await.unwrap();

    let err = rebind.await.unwrap().unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)), "got {:?}", err);

    let current = r.trips.get(trip.id).await.unwrap().unwrap();
    assert_eq!(current.bus_type_id, seats[0].bus_type_id);
}

#[sqlx::test(migrations = "../migrations")]
async fn delete_of_trip_with_reservations_is_refused(pool: PgPool) {
    let r = repos(&pool);
    let seats = bus_with_grid(&r, "Coach", 1, 1).await;
    let trip = trip(&r, seats[0].bus_type_id).await;
    commit_reservation(&r, seated(trip.id, seats[0].id, "Ahmad")).await;

    let registry = TripRegistry::new(r.trips.clone(), r.templates.clone());
    assert!(matches!(registry.delete(trip.id).await.unwrap_err(), CoreError::Conflict(_)));

    // The RESTRICT key backs the count check.
    let mut tx = r.trips.begin().await.unwrap();
    let err = tx.delete(trip.id).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)), "got {:?}", err);
}
