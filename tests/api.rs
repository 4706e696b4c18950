use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use showroom::app::{AppState, router};
use showroom::auth::SessionUser;
use showroom::config::Config;
use showroom::models::Role;

const ADMIN_EMAIL: &str = "admin@showroom.test";
const SALES_EMAIL: &str = "sales@showroom.test";

struct TestApp {
    _dir: TempDir,
    state: Arc<AppState>,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::with_data_dir(dir.path());
        config.admin_email = Some(ADMIN_EMAIL.to_string());
        config.admin_password = Some("admin-pass".to_string());
        config.seed_catalog = true;

        let state = Arc::new(AppState::open(&config).unwrap());
        state
            .users
            .register("Shubh", SALES_EMAIL, "sales-pass", Role::Sales, None)
            .unwrap();
        state
            .users
            .register("Riya", "riya@showroom.test", "riya-pass", Role::Sales, None)
            .unwrap();
        let router = router(state.clone());
        TestApp {
            _dir: dir,
            state,
            router,
        }
    }

    /// Session cookie for an account, skipping the login form.
    fn cookie_for(&self, email: &str, password: &str) -> String {
        let user = self.state.users.verify(email, password).unwrap().unwrap();
        let id = self.state.sessions.create(SessionUser::from(&user));
        format!("session={}", id)
    }

    fn admin(&self) -> String {
        self.cookie_for(ADMIN_EMAIL, "admin-pass")
    }

    fn sales(&self) -> String {
        self.cookie_for(SALES_EMAIL, "sales-pass")
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, header::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> (StatusCode, header::HeaderMap, Vec<u8>) {
        let mut builder = Request::get(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn json(&self, method: &str, uri: &str, cookie: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, _, bytes) = self.send(request).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get_json(&self, uri: &str, cookie: &str) -> (StatusCode, Value) {
        let (status, _, bytes) = self.get(uri, Some(cookie)).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn form(&self, uri: &str, cookie: Option<&str>, body: &str) -> (StatusCode, header::HeaderMap) {
        let mut builder = Request::post(uri).header(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        );
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let (status, headers, _) = self.send(builder.body(Body::from(body.to_string())).unwrap()).await;
        (status, headers)
    }

    async fn upload_chit(
        &self,
        cookie: &str,
        customer_id: &str,
        file_name: &str,
        content_type: &str,
        photo: &[u8],
    ) -> (StatusCode, Value) {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--XBOUNDARY\r\nContent-Disposition: form-data; name=\"chit\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                file_name, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(photo);
        body.extend_from_slice(b"\r\n--XBOUNDARY--\r\n");

        let request = Request::post(format!("/api/customers/{}/chit", customer_id))
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap();
        let (status, _, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn new_customer(&self, cookie: &str, name: &str) -> Value {
        let (status, customer) = self
            .json(
                "POST",
                "/api/customers",
                cookie,
                json!({ "name": name, "phone": "9876543210", "area": "Vijay Nagar" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        customer
    }

    async fn new_room(&self, cookie: &str, customer: &Value, sqft: f64) -> Value {
        let (status, room) = self
            .json(
                "POST",
                "/api/rooms",
                cookie,
                json!({ "customer_id": customer["id"], "room_name": "Living Room", "total_sqft": sqft }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        room
    }
}

fn location(headers: &header::HeaderMap) -> &str {
    headers
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn login_flow_and_page_guard() {
    let app = TestApp::new();

    let (status, headers, _) = app.get("/", None).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/login");

    let (_, headers) = app
        .form("/login", None, "email=sales%40showroom.test&password=wrong")
        .await;
    assert!(location(&headers).starts_with("/login?error="));
    assert!(headers.get(header::SET_COOKIE).is_none());

    let (_, headers) = app
        .form("/login", None, "email=sales%40showroom.test&password=sales-pass")
        .await;
    assert_eq!(location(&headers), "/");
    let set_cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    let cookie = set_cookie.split(';').next().unwrap().to_string();
    assert!(cookie.starts_with("session="));

    let (status, _, body) = app.get("/", Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("Welcome, Shubh"));

    let (_, headers, _) = app.get("/login", Some(&cookie)).await;
    assert_eq!(location(&headers), "/");

    let (_, headers, _) = app.get("/admin/tiles", Some(&cookie)).await;
    assert_eq!(location(&headers), "/");

    let (_, headers) = app.form("/logout", Some(&cookie), "").await;
    assert_eq!(location(&headers), "/login");
    let (_, headers, _) = app.get("/customers", Some(&cookie)).await;
    assert_eq!(location(&headers), "/login");
}

#[tokio::test]
async fn signup_creates_sales_account() {
    let app = TestApp::new();
    let (_, headers) = app
        .form(
            "/signup",
            None,
            "email=new%40showroom.test&password=pw123456&name=Neha&phone=9999999999",
        )
        .await;
    assert_eq!(location(&headers), "/login?registered=true");

    let (_, headers) = app
        .form("/signup", None, "email=new%40showroom.test&password=other&name=Neha")
        .await;
    assert!(location(&headers).starts_with("/login?error="));

    let cookie = app.cookie_for("new@showroom.test", "pw123456");
    let (status, me) = app.get_json("/api/me", &cookie).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "sales");
}

#[tokio::test]
async fn admin_pages_render_for_admin() {
    let app = TestApp::new();
    let admin = app.admin();
    for page in ["/admin/dashboard", "/admin/tiles", "/admin/chits", "/rooms/new", "/customer/new"] {
        let (status, _, body) = app.get(page, Some(&admin)).await;
        assert_eq!(status, StatusCode::OK, "{}", page);
        assert!(String::from_utf8(body).unwrap().contains("PAGE_DATA"), "{}", page);
    }
}

#[tokio::test]
async fn unknown_paths() {
    let app = TestApp::new();
    let (status, _, body) = app.get("/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(String::from_utf8(body).unwrap().contains("Page not found"));

    let (status, body) = app.get_json("/api/nowhere", &app.sales()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn api_needs_a_session() {
    let app = TestApp::new();
    let (status, _, body) = app.get("/api/customers", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert!(body["error"].is_string());

    let (status, _, _) = app.get("/api/customers", Some("session=forged")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn catalog_management_is_admin_only() {
    let app = TestApp::new();
    let tile = json!({
        "tile_name": "Sandstone",
        "size": "30x60",
        "pieces_per_box": 8,
        "sqft_per_box": 15.5,
        "barcode": "SS3060"
    });

    let (status, _) = app.json("POST", "/api/tiles", &app.sales(), tile.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = app.admin();
    let (status, created) = app.json("POST", "/api/tiles", &admin, tile.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["is_active"], true);

    let (status, _) = app.json("POST", "/api/tiles", &admin, tile).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let uri = format!("/api/tiles/{}/active", created["id"].as_str().unwrap());
    let (_, toggled) = app.json("POST", &uri, &admin, Value::Null).await;
    assert_eq!(toggled["is_active"], false);

    let (_, sales_view) = app.get_json("/api/tiles", &app.sales()).await;
    assert!(
        sales_view
            .as_array()
            .unwrap()
            .iter()
            .all(|t| t["tile_name"] != "Sandstone")
    );
    let (_, admin_view) = app.get_json("/api/tiles?q=sand", &admin).await;
    assert_eq!(admin_view.as_array().unwrap().len(), 1);

    let (status, _) = app.get_json("/api/scan/SS3060", &admin).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn selection_estimates_and_admin_review() {
    let app = TestApp::new();
    let sales = app.sales();
    let admin = app.admin();

    let (status, _) = app
        .json(
            "POST",
            "/api/customers",
            &sales,
            json!({ "name": "Amit", "phone": "98765", "area": "Palasia" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let customer = app.new_customer(&sales, "Amit").await;
    let room = app.new_room(&sales, &customer, 180.0).await;

    let (status, tile) = app.get_json("/api/scan/ME6060", &sales).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tile["tile_name"], "Marble Elegance");

    // a sales user's rate is ignored
    let (status, selection) = app
        .json(
            "POST",
            "/api/selections",
            &sales,
            json!({ "room_id": room["id"], "tile_id": tile["id"], "price_per_sqft": 85.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(selection["calculated_boxes"], 12);
    assert_eq!(selection["sqft_required"], 180.0);
    assert!(selection["estimated_price"].is_null());
    assert_eq!(selection["status"], "Draft");

    let id = selection["id"].as_str().unwrap();
    let (_, starred) = app
        .json("POST", &format!("/api/selections/{}/final", id), &sales, Value::Null)
        .await;
    assert_eq!(starred["is_final_choice"], true);

    let (status, _) = app
        .json("PATCH", &format!("/api/selections/{}", id), &sales, json!({ "status": "billed" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, reviewed) = app
        .json(
            "PATCH",
            &format!("/api/selections/{}", id),
            &admin,
            json!({
                "price_per_sqft": 85.0,
                "admin_adjusted_boxes": 13,
                "filler_quantity": 2,
                "transport_charge": 500.0,
                "admin_notes": "one spare box",
                "status": "reviewed"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reviewed["estimated_price"].as_f64(), Some(16320.0));
    assert_eq!(reviewed["effective_boxes"], 13);
    assert_eq!(reviewed["status"], "Reviewed");

    let (status, _) = app
        .json(
            "PATCH",
            &format!("/api/selections/{}", id),
            &admin,
            json!({ "admin_adjusted_boxes": -1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, cleared) = app
        .json(
            "PATCH",
            &format!("/api/selections/{}", id),
            &admin,
            json!({ "admin_adjusted_boxes": null, "price_per_sqft": null }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(cleared["admin_adjusted_boxes"].is_null());
    assert!(cleared["estimated_price"].is_null());
    assert_eq!(cleared["effective_boxes"], 12);
    assert_eq!(cleared["filler_quantity"], 2);

    let (status, _) = app
        .json(
            "PATCH",
            &format!("/api/selections/{}", id),
            &admin,
            json!({ "admin_adjusted_boxes": 13 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, detail) = app
        .get_json(&format!("/api/customers/{}", customer["id"].as_str().unwrap()), &admin)
        .await;
    let selections = &detail["rooms"][0]["selections"];
    assert_eq!(selections[0]["admin_notes"], "one spare box");
    assert_eq!(selections[0]["admin_adjusted_boxes"], 13);
}

#[tokio::test]
async fn sales_users_only_see_their_customers() {
    let app = TestApp::new();
    let shubh = app.sales();
    let riya = app.cookie_for("riya@showroom.test", "riya-pass");

    let customer = app.new_customer(&shubh, "Amit").await;
    let id = customer["id"].as_str().unwrap();

    let (status, _) = app.get_json(&format!("/api/customers/{}", id), &riya).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, list) = app.get_json("/api/customers", &riya).await;
    assert!(list.as_array().unwrap().is_empty());

    let (_, list) = app.get_json("/api/customers?q=amit", &shubh).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    let (_, list) = app.get_json("/api/customers?q=vijay", &app.admin()).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn estimate_endpoint() {
    let app = TestApp::new();
    let sales = app.sales();
    let (status, estimate) = app
        .json(
            "POST",
            "/api/estimate",
            &sales,
            json!({ "sqft_required": 120.0, "sqft_per_box": 15.5, "rate": 135.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(estimate["calculated_boxes"], 8);
    assert_eq!(estimate["estimated_price"].as_f64(), Some(16740.0));

    let (status, _) = app
        .json(
            "POST",
            "/api/estimate",
            &sales,
            json!({ "sqft_required": 120.0, "sqft_per_box": 0.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chit_upload_is_served_to_signed_in_users() {
    let app = TestApp::new();
    let sales = app.sales();
    let customer = app.new_customer(&sales, "Amit").await;
    let id = customer["id"].as_str().unwrap();

    let photo: &[u8] = b"\x89PNG\r\n\x1a\nnot-really-a-png";
    let (status, updated) = app.upload_chit(&sales, id, "chit.png", "image/png", photo).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["has_chit_photo"], true);
    let url = updated["chit_image_url"].as_str().unwrap().to_string();
    assert_eq!(url, format!("/uploads/chits/{}.png", id));

    let (status, _, served) = app.get(&url, Some(&sales)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(served, photo);

    let (status, _, served) = app.get(&url, Some(&app.admin())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(served, photo);

    let (_, headers, _) = app.get(&url, None).await;
    assert_eq!(location(&headers), "/login");

    let (status, _) = app.get_json("/api/chits", &sales).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, archive) = app.get_json("/api/chits", &app.admin()).await;
    assert_eq!(archive.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn chit_photo_follows_customer_visibility() {
    let app = TestApp::new();
    let shubh = app.sales();
    let riya = app.cookie_for("riya@showroom.test", "riya-pass");

    let customer = app.new_customer(&shubh, "Amit").await;
    let id = customer["id"].as_str().unwrap();
    let (status, updated) = app
        .upload_chit(&shubh, id, "chit.png", "image/png", b"PNGDATA")
        .await;
    assert_eq!(status, StatusCode::OK);
    let url = updated["chit_image_url"].as_str().unwrap().to_string();

    let (status, _, body) = app.get(&url, Some(&riya)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_ne!(body, b"PNGDATA");

    let (status, _, _) = app
        .get(&format!("/uploads/chits/{}.png", uuid::Uuid::new_v4()), Some(&shubh))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chit_reupload_replaces_previous_format() {
    let app = TestApp::new();
    let sales = app.sales();
    let customer = app.new_customer(&sales, "Amit").await;
    let id = customer["id"].as_str().unwrap();

    let (_, first) = app
        .upload_chit(&sales, id, "chit.jpg", "image/jpeg", b"JPEGDATA")
        .await;
    let old_url = first["chit_image_url"].as_str().unwrap().to_string();
    assert!(app.state.chits_dir.join(format!("{}.jpg", id)).exists());

    let (status, second) = app
        .upload_chit(&sales, id, "chit.png", "image/png", b"PNGDATA")
        .await;
    assert_eq!(status, StatusCode::OK);
    let new_url = second["chit_image_url"].as_str().unwrap().to_string();
    assert_ne!(old_url, new_url);

    assert!(!app.state.chits_dir.join(format!("{}.jpg", id)).exists());
    let (status, _, _) = app.get(&old_url, Some(&sales)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, served) = app.get(&new_url, Some(&sales)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(served, b"PNGDATA");
}
