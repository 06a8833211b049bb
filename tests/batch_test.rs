//! All-or-nothing batch operations

mod helpers;

use assert_matches::assert_matches;
use chrono::Duration;
use helpers::*;
use eventgate::engine::{BatchAction, BatchRequest, BatchStatus};
use eventgate::models::{EventStatus, NewRegistration, Placement, RegistrationStatus, UserRole};
use eventgate::services::Actor;
use eventgate::{EventGateError, RegistrationStore, StoreTransaction};

#[tokio::test]
async fn test_batch_cancel_rejected_when_one_member_attended() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Some(10)).await;
    let users = ctx.attendees(3).await;
    let mut ids = Vec::new();
    for user in &users {
        ids.push(ctx.engine.admit(event.id, user.id).await.unwrap());
    }

    ctx.at_event_offset(&event, Duration::hours(-3));
    ctx.engine.check_in(event.id, &ids[1].check_in_code, &ctx.organizer_actor()).await.unwrap();
    let before = ctx.store.registrations_for(event.id).await;

    let request = BatchRequest::new(BatchAction::CancelRegistrations, ids.iter().map(|r| r.id).collect())
        .with_reason("Venue change");
    let result = ctx.engine.apply_batch(request, &ctx.admin_actor()).await;

    assert_matches!(result, Err(EventGateError::BatchPreconditionFailed { id, .. }) if id == ids[1].id);
    assert_eq!(ctx.store.registrations_for(event.id).await, before);
    assert_eq!(ctx.notifier.count_of("batch_applied"), 0);
}

#[tokio::test]
async fn test_batch_cancel_promotes_and_recompacts() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Some(2)).await;
    let users = ctx.attendees(5).await;
    let mut registrations = Vec::new();
    for user in &users {
        registrations.push(ctx.engine.admit(event.id, user.id).await.unwrap());
    }
    // [R, R, W1, W2, W3]

    let request = BatchRequest::new(
        BatchAction::CancelRegistrations,
        vec![registrations[0].id, registrations[3].id],
    );
    let result = ctx.engine.apply_batch(request, &ctx.organizer_actor()).await.unwrap();

    assert_eq!(result.processed, 2);
    assert_eq!(result.summary, "Batch cancel completed: 2 registrations processed");
    assert!(result
        .items
        .iter()
        .all(|item| item.status == BatchStatus::Registration(RegistrationStatus::Cancelled)));

    let promoted = ctx.store.registration(registrations[2].id).await.unwrap();
    assert_eq!((promoted.status, promoted.waitlist_position), (RegistrationStatus::Registered, None));
    let last = ctx.store.registration(registrations[4].id).await.unwrap();
    assert_eq!((last.status, last.waitlist_position), (RegistrationStatus::Waitlisted, Some(1)));

    assert!(ctx.engine.audit_event(event.id).await.unwrap().is_clean());
    assert_eq!(ctx.notifier.count_of("waitlist_promoted"), 1);
    assert_eq!(ctx.notifier.count_of("batch_applied"), 1);
}

#[tokio::test]
async fn test_batch_check_in_requires_registered_members() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Some(2)).await;
    let users = ctx.attendees(3).await;
    let mut registrations = Vec::new();
    for user in &users {
        registrations.push(ctx.engine.admit(event.id, user.id).await.unwrap());
    }
    ctx.at_event_offset(&event, Duration::hours(-1));

    let with_waitlisted = BatchRequest::new(
        BatchAction::CheckInRegistrations,
        registrations.iter().map(|r| r.id).collect(),
    );
    assert_matches!(
        ctx.engine.apply_batch(with_waitlisted, &ctx.organizer_actor()).await,
        Err(EventGateError::BatchPreconditionFailed { id, .. }) if id == registrations[2].id
    );

    let admitted = BatchRequest::new(
        BatchAction::CheckInRegistrations,
        vec![registrations[0].id, registrations[1].id],
    );
    let result = ctx.engine.apply_batch(admitted, &ctx.organizer_actor()).await.unwrap();
    assert_eq!(result.processed, 2);

    for registration in &registrations[..2] {
        let stored = ctx.store.registration(registration.id).await.unwrap();
        assert_eq!(stored.status, RegistrationStatus::Attended);
        assert_eq!(stored.check_in_time, Some(ctx.clock_now()));
    }
}

#[tokio::test]
async fn test_batch_check_in_outside_window_fails() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Some(2)).await;
    let user = ctx.attendee().await;
    let registration = ctx.engine.admit(event.id, user.id).await.unwrap();

    let request = BatchRequest::new(BatchAction::CheckInRegistrations, vec![registration.id]);
    assert_matches!(
        ctx.engine.apply_batch(request, &ctx.admin_actor()).await,
        Err(EventGateError::BatchPreconditionFailed { reason, .. }) if reason.contains("Check-in")
    );
}

#[tokio::test]
async fn test_batch_promote_rechecks_capacity_per_item() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Some(2)).await;
    let users = ctx.attendees(4).await;
    let admitted = ctx.engine.admit(event.id, users[0].id).await.unwrap();

    // Waitlist entries left behind while a slot is free, as after a capacity change
    let mut tx = ctx.store.begin().await.unwrap();
    let mut waitlisted = Vec::new();
    for (position, user) in (1..).zip(&users[1..]) {
        let registration = NewRegistration::from_placement(
            event.id,
            user.id,
            Placement::Waitlisted { position },
            format!("WAIT{:02}", position),
            None,
            ctx.clock_now(),
        );
        waitlisted.push(tx.insert_registration(&registration).await.unwrap());
    }
    tx.commit().await.unwrap();

    // Only one slot is free, so the second member of the batch finds the event full
    let both = BatchRequest::new(BatchAction::PromoteRegistrations, vec![waitlisted[0].id, waitlisted[1].id]);
    assert_matches!(
        ctx.engine.apply_batch(both, &ctx.organizer_actor()).await,
        Err(EventGateError::BatchPreconditionFailed { id, reason }) if id == waitlisted[1].id && reason.contains("capacity")
    );
    let untouched = ctx.store.registration(waitlisted[0].id).await.unwrap();
    assert_eq!((untouched.status, untouched.waitlist_position), (RegistrationStatus::Waitlisted, Some(1)));

    let second = BatchRequest::new(BatchAction::PromoteRegistrations, vec![waitlisted[1].id]);
    let result = ctx.engine.apply_batch(second, &ctx.organizer_actor()).await.unwrap();
    assert_eq!(result.items[0].status, BatchStatus::Registration(RegistrationStatus::Registered));

    let registrations = ctx.store.registrations_for(event.id).await;
    let position_of = |id| registrations.iter().find(|r| r.id == id).and_then(|r| r.waitlist_position);
    assert_eq!(position_of(waitlisted[0].id), Some(1));
    assert_eq!(position_of(waitlisted[2].id), Some(2));
    assert_eq!(position_of(admitted.id), None);
    assert!(ctx.engine.audit_event(event.id).await.unwrap().is_clean());
}

#[tokio::test]
async fn test_batch_promote_rejects_registered_member() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Some(3)).await;
    let user = ctx.attendee().await;
    let registration = ctx.engine.admit(event.id, user.id).await.unwrap();

    let request = BatchRequest::new(BatchAction::PromoteRegistrations, vec![registration.id]);
    assert_matches!(
        ctx.engine.apply_batch(request, &ctx.admin_actor()).await,
        Err(EventGateError::BatchPreconditionFailed { id, .. }) if id == registration.id
    );
}

#[tokio::test]
async fn test_attendee_batches_only_cancel_own_registrations() {
    let ctx = TestContext::new().await;
    let first = ctx.event(Some(5)).await;
    let second = ctx.event(Some(5)).await;
    let users = ctx.attendees(2).await;
    let attendee = Actor::attendee(users[0].id);

    let own_first = ctx.engine.admit(first.id, users[0].id).await.unwrap();
    let own_second = ctx.engine.admit(second.id, users[0].id).await.unwrap();
    let foreign = ctx.engine.admit(first.id, users[1].id).await.unwrap();

    let check_in = BatchRequest::new(BatchAction::CheckInRegistrations, vec![own_first.id]);
    assert_matches!(ctx.engine.apply_batch(check_in, &attendee).await, Err(EventGateError::Forbidden(_)));

    let mixed = BatchRequest::new(BatchAction::CancelRegistrations, vec![own_first.id, foreign.id]);
    assert_matches!(
        ctx.engine.apply_batch(mixed, &attendee).await,
        Err(EventGateError::BatchPreconditionFailed { id, .. }) if id == foreign.id
    );

    let own = BatchRequest::new(BatchAction::CancelRegistrations, vec![own_second.id, own_first.id]);
    let result = ctx.engine.apply_batch(own, &attendee).await.unwrap();
    assert_eq!(result.items.iter().map(|item| item.id).collect::<Vec<_>>(), vec![own_second.id, own_first.id]);
}

#[tokio::test]
async fn test_batch_shape_and_missing_members() {
    let ctx = TestContext::new().await;
    let event = ctx.event(Some(5)).await;
    let user = ctx.attendee().await;
    let registration = ctx.engine.admit(event.id, user.id).await.unwrap();

    let empty = BatchRequest::new(BatchAction::CancelRegistrations, vec![]);
    assert_matches!(ctx.engine.apply_batch(empty, &ctx.admin_actor()).await, Err(EventGateError::InvalidInput(_)));

    let duplicate = BatchRequest::new(BatchAction::CancelRegistrations, vec![registration.id, registration.id]);
    assert_matches!(ctx.engine.apply_batch(duplicate, &ctx.admin_actor()).await, Err(EventGateError::InvalidInput(_)));

    let missing = uuid::Uuid::new_v4();
    let with_missing = BatchRequest::new(BatchAction::CancelRegistrations, vec![registration.id, missing]);
    assert_matches!(
        ctx.engine.apply_batch(with_missing, &ctx.admin_actor()).await,
        Err(EventGateError::BatchPreconditionFailed { id, reason }) if id == missing && reason == "not found"
    );
    assert_eq!(
        ctx.store.registration(registration.id).await.unwrap().status,
        RegistrationStatus::Registered
    );
}

#[tokio::test]
async fn test_event_batches() {
    let ctx = TestContext::new().await;
    let upcoming = ctx.event(Some(5)).await;
    let past = ctx.event_starting_in(Some(5), Duration::days(-2)).await;

    let archive_upcoming = BatchRequest::new(BatchAction::ArchiveEvents, vec![past.id, upcoming.id]);
    assert_matches!(
        ctx.engine.apply_batch(archive_upcoming, &ctx.admin_actor()).await,
        Err(EventGateError::BatchPreconditionFailed { id, .. }) if id == upcoming.id
    );

    let archive = BatchRequest::new(BatchAction::ArchiveEvents, vec![past.id]);
    let result = ctx.engine.apply_batch(archive, &ctx.organizer_actor()).await.unwrap();
    assert_eq!(result.items[0].status, BatchStatus::Event(EventStatus::Completed));

    let republish = BatchRequest::new(BatchAction::PublishEvents, vec![upcoming.id]);
    assert_matches!(
        ctx.engine.apply_batch(republish, &ctx.admin_actor()).await,
        Err(EventGateError::BatchPreconditionFailed { .. })
    );

    let stranger = Actor::organizer(uuid::Uuid::new_v4());
    let foreign = BatchRequest::new(BatchAction::CancelEvents, vec![upcoming.id]);
    assert_matches!(
        ctx.engine.apply_batch(foreign, &stranger).await,
        Err(EventGateError::BatchPreconditionFailed { .. })
    );
    assert_eq!(ctx.store.event(upcoming.id).await.unwrap().status, EventStatus::Published);
}

#[tokio::test]
async fn test_user_batches() {
    let ctx = TestContext::new().await;
    let users = ctx.attendees(2).await;
    let ids: Vec<_> = users.iter().map(|u| u.id).collect();

    let promote = BatchRequest::new(BatchAction::PromoteUsers { role: UserRole::Organizer }, ids.clone());
    assert_matches!(
        ctx.engine.apply_batch(promote.clone(), &ctx.organizer_actor()).await,
        Err(EventGateError::Forbidden(_))
    );

    let result = ctx.engine.apply_batch(promote, &ctx.admin_actor()).await.unwrap();
    assert_eq!(result.summary, "Batch promote completed: 2 users processed");
    for id in &ids {
        assert_eq!(ctx.store.user(*id).await.unwrap().role, UserRole::Organizer);
    }

    let self_demote = BatchRequest::new(BatchAction::DemoteUsers, vec![ids[0], ctx.admin.id]);
    assert_matches!(
        ctx.engine.apply_batch(self_demote, &ctx.admin_actor()).await,
        Err(EventGateError::BatchPreconditionFailed { id, .. }) if id == ctx.admin.id
    );
    assert_eq!(ctx.store.user(ids[0]).await.unwrap().role, UserRole::Organizer);

    let demote = BatchRequest::new(BatchAction::DemoteUsers, ids.clone());
    ctx.engine.apply_batch(demote, &ctx.admin_actor()).await.unwrap();
    assert_eq!(ctx.store.user(ids[1]).await.unwrap().role, UserRole::Attendee);
}
