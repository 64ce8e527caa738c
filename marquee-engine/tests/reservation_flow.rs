use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use marquee_core::{BookingStatus, ReservationError, ReservationStore};
use marquee_engine::{PaymentBridge, ReservationEngine, ReservationPolicy};
use marquee_store::MemoryStore;

fn engine_over(store: Arc<MemoryStore>) -> ReservationEngine {
    ReservationEngine::new(store, ReservationPolicy::new(420, "USD".into()))
}

async fn seed_show(engine: &ReservationEngine, price: i64) -> Uuid {
    let shows = engine
        .schedule_shows("tt0133093", price, &[Utc::now() + Duration::hours(3)])
        .await
        .unwrap();
    shows[0].id
}

#[tokio::test]
async fn overlapping_request_conflicts_and_claims_nothing() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    let show_id = seed_show(&engine, 10).await;

    let won = engine
        .reserve_seats(show_id, &["A1".into(), "A2".into()], "u1")
        .await
        .unwrap();
    assert_eq!(won.amount, 20);
    assert_eq!(won.seats, vec!["A1".to_string(), "A2".to_string()]);

    let status = store.booking(won.booking_id).await.unwrap().unwrap();
    assert_eq!(status.status, BookingStatus::Pending);

    // A2 is taken; the whole request must fail and claim neither A2 nor A3.
    let lost = engine
        .reserve_seats(show_id, &["A2".into(), "A3".into()], "u2")
        .await;
    match lost {
        Err(ReservationError::SeatConflict { occupied }) => {
            assert_eq!(occupied, vec!["A1".to_string(), "A2".to_string()]);
        }
        other => panic!("expected seat conflict, got {other:?}"),
    }

    assert_eq!(
        engine.occupied_seats(show_id).await.unwrap(),
        vec!["A1".to_string(), "A2".to_string()]
    );
}

#[tokio::test]
async fn concurrent_overlapping_reserves_admit_at_most_one_winner() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(engine_over(store.clone()));
    let show_id = seed_show(&engine, 10).await;

    let a = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .reserve_seats(show_id, &["C1".into(), "C2".into()], "u1")
                .await
        })
    };
    let b = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .reserve_seats(show_id, &["C2".into(), "C3".into()], "u2")
                .await
        })
    };

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    let winners = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(winners, 1, "exactly one of the overlapping claims may win");

    // The map holds exactly the winner's seats, never a mix.
    let occupied = engine.occupied_seats(show_id).await.unwrap();
    let expected = if a.is_ok() {
        vec!["C1".to_string(), "C2".to_string()]
    } else {
        vec!["C2".to_string(), "C3".to_string()]
    };
    assert_eq!(occupied, expected);
}

#[tokio::test]
async fn malformed_requests_never_touch_the_map() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    let show_id = seed_show(&engine, 10).await;

    for seats in [
        vec![],
        vec!["A1".to_string(), "A1".to_string()],
        vec!["   ".to_string()],
    ] {
        assert!(matches!(
            engine.reserve_seats(show_id, &seats, "u1").await,
            Err(ReservationError::InvalidRequest(_))
        ));
    }
    assert!(matches!(
        engine.reserve_seats(show_id, &["A1".into()], "  ").await,
        Err(ReservationError::InvalidRequest(_))
    ));
    assert!(engine.occupied_seats(show_id).await.unwrap().is_empty());

    assert!(matches!(
        engine.reserve_seats(Uuid::new_v4(), &["A1".into()], "u1").await,
        Err(ReservationError::ShowNotFound(_))
    ));
}

#[tokio::test]
async fn booking_status_is_owner_only() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    let bridge = PaymentBridge::new(store.clone());
    let show_id = seed_show(&engine, 15).await;

    let reservation = engine
        .reserve_seats(show_id, &["D4".into()], "u1")
        .await
        .unwrap();

    let booking = bridge
        .booking_status(reservation.booking_id, "u1")
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.amount, 15);
    assert_eq!(booking.seats, vec!["D4".to_string()]);

    assert!(matches!(
        bridge.booking_status(reservation.booking_id, "u2").await,
        Err(ReservationError::Forbidden)
    ));
    assert!(matches!(
        bridge.booking_status(Uuid::new_v4(), "u1").await,
        Err(ReservationError::BookingNotFound(_))
    ));
}

#[tokio::test]
async fn payment_session_registration_checks_ownership() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    let bridge = PaymentBridge::new(store.clone());
    let show_id = seed_show(&engine, 10).await;

    let reservation = engine
        .reserve_seats(show_id, &["E1".into()], "u1")
        .await
        .unwrap();

    assert!(matches!(
        bridge
            .register_session(reservation.booking_id, "u2", "cs_test_1")
            .await,
        Err(ReservationError::Forbidden)
    ));

    bridge
        .register_session(reservation.booking_id, "u1", "cs_test_1")
        .await
        .unwrap();

    // The stored reference correlates the provider callback to the booking.
    bridge.confirm_session("cs_test_1").await.unwrap();
    let booking = bridge
        .booking_status(reservation.booking_id, "u1")
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Paid);
    assert!(booking.payment_session.is_none(), "link cleared once paid");

    // Paid bookings cannot start a new payment session.
    assert!(matches!(
        bridge
            .register_session(reservation.booking_id, "u1", "cs_test_2")
            .await,
        Err(ReservationError::InvalidState(_))
    ));
}

#[tokio::test]
async fn session_ref_bound_elsewhere_is_a_client_error_not_a_storage_fault() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    let bridge = PaymentBridge::new(store.clone());
    let show_id = seed_show(&engine, 10).await;

    let first = engine
        .reserve_seats(show_id, &["G1".into()], "u1")
        .await
        .unwrap();
    let second = engine
        .reserve_seats(show_id, &["G2".into()], "u1")
        .await
        .unwrap();

    bridge
        .register_session(first.booking_id, "u1", "cs_test_shared")
        .await
        .unwrap();

    // Reusing a session ref that belongs to another booking is rejected as
    // an invalid state, never surfaced as a storage failure.
    assert!(matches!(
        bridge
            .register_session(second.booking_id, "u1", "cs_test_shared")
            .await,
        Err(ReservationError::InvalidState(_))
    ));

    // The original link is untouched and still resolves its booking.
    bridge.confirm_session("cs_test_shared").await.unwrap();
    let booking = bridge.booking_status(first.booking_id, "u1").await.unwrap();
    assert_eq!(booking.status, BookingStatus::Paid);
}

#[tokio::test]
async fn bookings_list_is_newest_first_and_scoped_to_requester() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());
    let show_id = seed_show(&engine, 10).await;

    let first = engine
        .reserve_seats(show_id, &["F1".into()], "u1")
        .await
        .unwrap();
    let second = engine
        .reserve_seats(show_id, &["F2".into()], "u1")
        .await
        .unwrap();
    engine
        .reserve_seats(show_id, &["F3".into()], "u2")
        .await
        .unwrap();

    let mine = engine.bookings_for("u1").await.unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].id, second.booking_id);
    assert_eq!(mine[1].id, first.booking_id);
}

#[tokio::test]
async fn scheduling_skips_past_times_and_rejects_all_past_input() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(store.clone());

    let past = Utc::now() - Duration::hours(1);
    let future = Utc::now() + Duration::hours(1);

    let created = engine
        .schedule_shows("tt0133093", 12, &[past, future])
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].seat_price, 12);
    assert!(created[0].occupied.is_empty());

    assert!(matches!(
        engine.schedule_shows("tt0133093", 12, &[past]).await,
        Err(ReservationError::InvalidRequest(_))
    ));
    assert!(matches!(
        engine.schedule_shows("tt0133093", 0, &[future]).await,
        Err(ReservationError::InvalidRequest(_))
    ));

    let upcoming = engine.upcoming_shows().await.unwrap();
    assert_eq!(upcoming.len(), 1);
    assert_eq!(upcoming[0].id, created[0].id);
}
