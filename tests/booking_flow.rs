//! End-to-end booking flow through the HTTP router, backed by the in-memory
//! document store, in-memory pending bookings and a scripted payment provider

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Days, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use papilio_server::{
    api,
    config::{
        AppConfig, AuthConfig, BookingConfig, DatabaseConfig, EmailConfig, LoggingConfig,
        PaymentConfig, RedisConfig, ServerConfig,
    },
    dates::{today_in, DATE_FORMAT},
    error::{AppError, AppResult},
    models::{
        booking::{PaymentOutcome, PendingBooking},
        user::IdentityClaims,
    },
    repository::{MemoryDocumentStore, Repository},
    services::{
        payments::{
            CheckoutSession, CreatedCheckoutSession, CreatedProduct, NewCheckoutSession,
            NewProduct, PaymentProvider, ProductUpdate, UpdatedProduct,
        },
        pending::MemoryPendingBookings,
        Services,
    },
    AppState,
};

const SECRET: &str = "test-secret";
const ADMIN_EMAIL: &str = "admin@papilio.org";

/// Payment provider that records sessions and lets the test mark them paid
#[derive(Default)]
struct ScriptedPayments {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
}

impl ScriptedPayments {
    fn mark_paid(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(session_id).unwrap();
        session.status = Some("complete".into());
        session.payment_status = Some("paid".into());
        session.payment_intent = Some(format!("pi_{}", session_id));
    }
}

#[async_trait]
impl PaymentProvider for ScriptedPayments {
    async fn create_customer(&self, _email: &str, user_id: &str) -> AppResult<String> {
        Ok(format!("cus_{}", user_id))
    }

    async fn create_product(&self, product: &NewProduct) -> AppResult<CreatedProduct> {
        Ok(CreatedProduct {
            product_id: format!("prod_{}", product.metadata[0].1),
            price_id: format!("price_{}", product.unit_amount),
        })
    }

    async fn update_product(&self, _update: &ProductUpdate) -> AppResult<UpdatedProduct> {
        Ok(UpdatedProduct { price_id: None })
    }

    async fn deactivate_product(&self, _product_id: &str) -> AppResult<()> {
        Ok(())
    }

    async fn create_checkout_session(
        &self,
        session: &NewCheckoutSession,
    ) -> AppResult<CreatedCheckoutSession> {
        let mut sessions = self.sessions.lock().unwrap();
        let id = format!("cs_test_{}", sessions.len() + 1);
        sessions.insert(
            id.clone(),
            CheckoutSession {
                id: id.clone(),
                status: Some("open".into()),
                payment_status: Some("unpaid".into()),
                payment_intent: None,
                amount_total: Some(1200 * i64::from(session.quantity)),
                currency: Some("eur".into()),
                metadata: session.metadata.iter().cloned().collect(),
            },
        );
        Ok(CreatedCheckoutSession {
            session_id: id,
            url: None,
            client_secret: Some("cs_secret".into()),
        })
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> AppResult<CheckoutSession> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| AppError::Provider(format!("No such checkout session: {}", session_id)))
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig::default(),
        database: DatabaseConfig::default(),
        auth: AuthConfig {
            jwt_secret: SECRET.into(),
            bootstrap_admins: vec![ADMIN_EMAIL.into()],
        },
        logging: LoggingConfig::default(),
        email: EmailConfig::default(),
        redis: RedisConfig::default(),
        payment: PaymentConfig {
            api_base: "http://127.0.0.1:9".into(),
            secret_key: "sk_test".into(),
            webhook_secret: "whsec_test".into(),
            currency: "eur".into(),
            return_url: "http://localhost/return?session_id={CHECKOUT_SESSION_ID}".into(),
        },
        booking: BookingConfig::default(),
    }
}

struct TestApp {
    router: Router,
    payments: Arc<ScriptedPayments>,
    services: Arc<Services>,
}

fn app() -> TestApp {
    let config = test_config();
    let payments = Arc::new(ScriptedPayments::default());
    let repository = Repository::new(Arc::new(MemoryDocumentStore::new()));
    let services = Arc::new(
        Services::new(
            repository,
            payments.clone(),
            Arc::new(MemoryPendingBookings::new()),
            &config,
        )
        .unwrap(),
    );
    let router = api::create_router(AppState {
        config: Arc::new(config),
        services: services.clone(),
    });
    TestApp {
        router,
        payments,
        services,
    }
}

fn token(sub: &str, email: &str) -> String {
    let now = Utc::now().timestamp();
    IdentityClaims {
        sub: sub.into(),
        email: email.into(),
        name: None,
        exp: now + 3600,
        iat: now,
    }
    .create_token(SECRET)
    .unwrap()
}

fn admin() -> String {
    token("admin-1", ADMIN_EMAIL)
}

fn visitor(n: u32) -> String {
    token(&format!("visitor-{}", n), &format!("visitor{}@example.org", n))
}

async fn call(
    app: &TestApp,
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(t) = bearer {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    let request = match body {
        Some(b) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn day(offset: u64) -> String {
    (today_in(chrono_tz::Europe::Rome) + Days::new(offset))
        .format(DATE_FORMAT)
        .to_string()
}

async fn seed_catalog(app: &TestApp, slots: u32) {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/v1/visit-types",
        Some(&admin()),
        Some(json!({ "name": "Casa delle Farfalle", "price": "12.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["id"], "casa-delle-farfalle");
    assert_eq!(body["stripe_price_id"], "price_1200");

    let (status, body) = call(
        app,
        Method::POST,
        "/api/v1/schedules/bulk",
        Some(&admin()),
        Some(json!({
            "visit_type": "casa-delle-farfalle",
            "start_date": day(7),
            "end_date": day(9),
            "start_time": "09:00",
            "end_time": "12:00",
            "available_slots": slots,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["schedule_ids"].as_array().unwrap().len(), 3);
}

fn schedule_id(offset: u64) -> String {
    format!("casa-delle-farfalle_{}_09:00-12:00", day(offset))
}

async fn checkout(app: &TestApp, bearer: &str, party_size: u32) -> (StatusCode, Value) {
    let attendees: Vec<Value> = (0..party_size)
        .map(|i| json!({ "name": format!("Guest {}", i) }))
        .collect();
    call(
        app,
        Method::POST,
        "/api/v1/reservations/checkout",
        Some(bearer),
        Some(json!({
            "schedule_id": schedule_id(7),
            "party_size": party_size,
            "attendees": attendees,
        })),
    )
    .await
}

#[tokio::test]
async fn visitor_books_the_last_slots() {
    let app = app();
    seed_catalog(&app, 2).await;

    // Bulk days are offered as plain start times
    let uri = format!(
        "/api/v1/availability?visit_type=casa-delle-farfalle&date={}&party_size=2",
        day(7)
    );
    let (status, slots) = call(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(slots.as_array().unwrap().len(), 1);
    assert_eq!(slots[0]["time"], "09:00");
    assert!(slots[0].get("end_time").is_none());

    let (status, session) = checkout(&app, &visitor(1), 2).await;
    assert_eq!(status, StatusCode::CREATED, "{}", session);
    let session_id = session["session_id"].as_str().unwrap().to_string();

    // Not paid yet
    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/reservations/confirm",
        Some(&visitor(1)),
        Some(json!({ "session_id": session_id })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    app.payments.mark_paid(&session_id);
    let (status, reservation) = call(
        &app,
        Method::POST,
        "/api/v1/reservations/confirm",
        Some(&visitor(1)),
        Some(json!({ "session_id": session_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", reservation);
    assert_eq!(reservation["num_people"], 2);
    assert_eq!(reservation["amount_total"], 2400);

    // Reloading the confirmation page returns the same reservation
    let (status, again) = call(
        &app,
        Method::POST,
        "/api/v1/reservations/confirm",
        Some(&visitor(1)),
        Some(json!({ "session_id": session_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["id"], reservation["id"]);

    let schedule = app.services.schedules.get(&schedule_id(7)).await.unwrap();
    assert_eq!(schedule.available_slots, 0);

    // Exhausted day disappears from search, other days remain
    let uri = "/api/v1/availability?visit_type=casa-delle-farfalle&party_size=1";
    let (_, slots) = call(&app, Method::GET, uri, None, None).await;
    let dates: Vec<&str> = slots
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["date"].as_str().unwrap())
        .collect();
    assert_eq!(dates, vec![day(8).as_str(), day(9).as_str()]);

    let (status, _) = checkout(&app, &visitor(2), 1).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, mine) = call(&app, Method::GET, "/api/v1/reservations/me", Some(&visitor(1)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let uri = format!("/api/v1/reservations?schedule_id={}", schedule_id(7));
    let (status, listed) = call(&app, Method::GET, &uri, Some(&admin()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_confirmations_never_oversell() {
    let app = app();
    seed_catalog(&app, 2).await;

    let pending: Vec<PendingBooking> = (1..=3)
        .map(|n| PendingBooking {
            session_id: format!("cs_race_{}", n),
            user_id: format!("visitor-{}", n),
            schedule_id: schedule_id(7),
            visit_type: "casa-delle-farfalle".into(),
            party_size: 1,
            attendees: vec![],
            created_at: Utc::now(),
        })
        .collect();
    let outcomes: Vec<PaymentOutcome> = pending
        .iter()
        .map(|p| PaymentOutcome {
            session_id: p.session_id.clone(),
            paid: true,
            payment_intent_id: None,
            amount_total: 1200,
            currency: "eur".into(),
        })
        .collect();

    let reservations = &app.services.reservations;
    let (a, b, c) = tokio::join!(
        reservations.confirm(&pending[0], &outcomes[0]),
        reservations.confirm(&pending[1], &outcomes[1]),
        reservations.confirm(&pending[2], &outcomes[2]),
    );
    let results = [a, b, c];

    let confirmed = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::Capacity(_))))
        .count();
    assert_eq!((confirmed, refused), (2, 1));

    let schedule = app.services.schedules.get(&schedule_id(7)).await.unwrap();
    assert_eq!(schedule.available_slots, 0);
}

#[tokio::test]
async fn admin_surface_is_guarded() {
    let app = app();
    let body = json!({
        "visit_type": "casa-delle-farfalle",
        "date": day(3),
        "time": "10:00",
        "available_slots": 5,
    });

    let (status, _) = call(&app, Method::POST, "/api/v1/schedules/individual", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/schedules/individual",
        Some(&visitor(1)),
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = call(
        &app,
        Method::POST,
        "/api/v1/schedules/individual",
        Some(&admin()),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        created["id"],
        format!("casa-delle-farfalle_{}_10:00", day(3))
    );

    // Visitors cannot promote themselves
    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/v1/users/visitor-1/role",
        Some(&visitor(1)),
        Some(json!({ "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, me) = call(&app, Method::GET, "/api/v1/users/me", Some(&visitor(1)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "user");
}

#[tokio::test]
async fn invalid_schedule_input_is_rejected() {
    let app = app();

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/schedules/bulk",
        Some(&admin()),
        Some(json!({
            "visit_type": "casa-delle-farfalle",
            "start_date": day(9),
            "end_date": day(7),
            "start_time": "09:00",
            "end_time": "12:00",
            "available_slots": 10,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/schedules/individual",
        Some(&admin()),
        Some(json!({
            "visit_type": "casa-delle-farfalle",
            "date": day(3),
            "time": "10:00",
            "available_slots": "many",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, listed) = call(&app, Method::GET, "/api/v1/schedules", Some(&admin()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn health_endpoints_respond() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = call(&app, Method::GET, "/api/v1/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}
