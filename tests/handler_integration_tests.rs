mod common;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use common::{PASSWORD, body_json, mock_state, seed_subject, seed_user};
use study_buddy::{
    AppError,
    auth::{AdminUser, AuthUser, VerifiedUser},
    extract::{AppJson, AppPath},
    handlers,
    models::{CreateSubjectRequest, LoginRequest, NewMaterial, RegisterRequest, Role},
    repository::Repository,
};
use uuid::Uuid;

fn register_request(name: &str, email: &str, password: &str) -> RegisterRequest {
    RegisterRequest {
        name: name.to_string(),
        email: email.to_string(),
        password: password.to_string(),
    }
}

#[tokio::test]
async fn register_creates_an_unverified_user() {
    let (state, _) = mock_state();

    let (status, Json(response)) = handlers::register(
        State(state.clone()),
        AppJson(register_request("  Ann  ", " Ann@Example.COM ", "secret123")),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        response.message,
        "Registration successful. Please wait for admin verification."
    );
    assert_eq!(response.user.name, "Ann");
    assert_eq!(response.user.email, "ann@example.com");
    assert_eq!(response.user.role, Role::User);
    assert!(!response.user.is_verified);

    let stored = state
        .repo
        .get_user_by_email("ann@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_ne!(stored.password_hash, "secret123");
}

#[tokio::test]
async fn register_rejects_duplicate_email() {
    let (state, _) = mock_state();
    seed_user(&state, "ann@example.com", Role::User, false).await;

    let err = handlers::register(
        State(state.clone()),
        AppJson(register_request("Ann", "ANN@example.com", "secret123")),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::Conflict(ref m) if m == "User already exists"));
    assert_eq!(state.repo.list_users().await.unwrap().len(), 1);
}

#[tokio::test]
async fn register_reports_every_invalid_field() {
    let (state, _) = mock_state();

    let err = handlers::register(State(state.clone()), AppJson(register_request("", "nope", "123")))
        .await
        .unwrap_err();

    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["message"], "Validation failed");
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["email", "name", "password"]);
    assert!(state.repo.list_users().await.unwrap().is_empty());
}

#[tokio::test]
async fn login_returns_token_and_profile() {
    let (state, _) = mock_state();
    let user = seed_user(&state, "ann@example.com", Role::User, false).await;

    let Json(response) = handlers::login(
        State(state.clone()),
        AppJson(LoginRequest {
            email: "Ann@Example.com".to_string(),
            password: PASSWORD.to_string(),
        }),
    )
    .await
    .unwrap();

    assert!(!response.token.is_empty());
    assert_eq!(response.user.id, user.id);
    assert!(!response.user.is_verified);
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let (state, _) = mock_state();
    seed_user(&state, "ann@example.com", Role::User, true).await;

    for (email, password) in [("ann@example.com", "wrong-password"), ("nobody@example.com", PASSWORD)] {
        let err = handlers::login(
            State(state.clone()),
            AppJson(LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "Invalid credentials"));
    }
}

#[tokio::test]
async fn get_me_reflects_current_state() {
    let (state, _) = mock_state();
    let user = seed_user(&state, "ann@example.com", Role::User, false).await;
    state.repo.verify_user(user.id).await.unwrap();

    let Json(profile) = handlers::get_me(AuthUser { id: user.id }, State(state.clone()))
        .await
        .unwrap();
    assert!(profile.is_verified);

    let err = handlers::get_me(AuthUser { id: Uuid::new_v4() }, State(state))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_subject_records_the_admin_as_creator() {
    let (state, _) = mock_state();
    let admin = seed_user(&state, "admin@example.com", Role::Admin, true).await;

    let (status, Json(subject)) = handlers::create_subject(
        AdminUser(admin.clone()),
        State(state.clone()),
        AppJson(CreateSubjectRequest {
            name: " Algebra ".to_string(),
            description: Some("   ".to_string()),
        }),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(subject.name, "Algebra");
    assert_eq!(subject.description, None);
    assert_eq!(subject.created_by, admin.id);

    let Json(subjects) = handlers::list_subjects(VerifiedUser(admin.clone()), State(state.clone()))
        .await
        .unwrap();
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0].creator_name.as_deref(), Some("admin"));
}

#[tokio::test]
async fn create_subject_rejects_duplicates_and_blank_names() {
    let (state, _) = mock_state();
    let admin = seed_user(&state, "admin@example.com", Role::Admin, true).await;
    seed_subject(&state, "Algebra", &admin).await;

    let duplicate = handlers::create_subject(
        AdminUser(admin.clone()),
        State(state.clone()),
        AppJson(CreateSubjectRequest {
            name: "Algebra".to_string(),
            description: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(duplicate, AppError::Conflict(ref m) if m == "Subject already exists"));

    let blank = handlers::create_subject(
        AdminUser(admin),
        State(state.clone()),
        AppJson(CreateSubjectRequest {
            name: "   ".to_string(),
            description: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(blank, AppError::Validation(_)));
    assert_eq!(state.repo.list_subjects().await.unwrap().len(), 1);
}

#[tokio::test]
async fn list_materials_is_newest_first_with_uploader_names() {
    let (state, _) = mock_state();
    let admin = seed_user(&state, "admin@example.com", Role::Admin, true).await;
    let subject = seed_subject(&state, "Physics", &admin).await;

    for title in ["first", "second"] {
        state
            .repo
            .create_material(NewMaterial {
                title: title.to_string(),
                description: None,
                subject_id: subject.id,
                file_url: format!("http://files/{}", title),
                file_name: format!("{}.pdf", title),
                file_size: 10,
                uploaded_by: admin.id,
            })
            .await
            .unwrap();
    }

    let Json(materials) = handlers::list_materials(
        VerifiedUser(admin.clone()),
        State(state.clone()),
        AppPath(subject.id),
    )
    .await
    .unwrap();

    let titles: Vec<&str> = materials.iter().map(|m| m.title.as_str()).collect();
    assert_eq!(titles, vec!["second", "first"]);
    assert_eq!(materials[0].uploader_name.as_deref(), Some("admin"));

    // An unknown subject simply has nothing in it.
    let Json(none) = handlers::list_materials(VerifiedUser(admin), State(state), AppPath(Uuid::new_v4()))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn verify_user_sets_the_flag_and_reports_missing_users() {
    let (state, _) = mock_state();
    let admin = seed_user(&state, "admin@example.com", Role::Admin, true).await;
    let member = seed_user(&state, "ann@example.com", Role::User, false).await;

    let Json(message) = handlers::verify_user(AdminUser(admin.clone()), State(state.clone()), AppPath(member.id))
        .await
        .unwrap();
    assert_eq!(message.message, "User verified successfully");
    assert!(state.repo.get_user(member.id).await.unwrap().unwrap().is_verified);

    // Verifying twice is harmless.
    handlers::verify_user(AdminUser(admin.clone()), State(state.clone()), AppPath(member.id))
        .await
        .unwrap();

    let err = handlers::verify_user(AdminUser(admin), State(state), AppPath(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(ref m) if m == "User not found"));
}

#[tokio::test]
async fn admins_cannot_be_deleted() {
    let (state, _) = mock_state();
    let admin = seed_user(&state, "admin@example.com", Role::Admin, true).await;
    let other_admin = seed_user(&state, "root@example.com", Role::Admin, true).await;

    let err = handlers::delete_user(AdminUser(admin.clone()), State(state.clone()), AppPath(other_admin.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref m) if m == "Cannot delete admin user"));

    // Not even themselves.
    let err = handlers::delete_user(AdminUser(admin.clone()), State(state.clone()), AppPath(admin.id))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);

    assert_eq!(state.repo.list_users().await.unwrap().len(), 2);
}

#[tokio::test]
async fn delete_user_removes_members() {
    let (state, _) = mock_state();
    let admin = seed_user(&state, "admin@example.com", Role::Admin, true).await;
    let member = seed_user(&state, "ann@example.com", Role::User, true).await;

    let Json(message) = handlers::delete_user(AdminUser(admin.clone()), State(state.clone()), AppPath(member.id))
        .await
        .unwrap();
    assert_eq!(message.message, "User deleted successfully");
    assert!(state.repo.get_user(member.id).await.unwrap().is_none());

    let err = handlers::delete_user(AdminUser(admin), State(state), AppPath(member.id))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn analytics_counts_everything() {
    let (state, _) = mock_state();
    let admin = seed_user(&state, "admin@example.com", Role::Admin, true).await;
    seed_user(&state, "ann@example.com", Role::User, false).await;
    let subject = seed_subject(&state, "Biology", &admin).await;
    let material = state
        .repo
        .create_material(NewMaterial {
            title: "Cells".to_string(),
            description: None,
            subject_id: subject.id,
            file_url: "http://files/cells.pdf".to_string(),
            file_name: "cells.pdf".to_string(),
            file_size: 42,
            uploaded_by: admin.id,
        })
        .await
        .unwrap();
    state.repo.record_download(material.id).await.unwrap();
    state.repo.record_download(material.id).await.unwrap();

    let Json(analytics) = handlers::get_analytics(AdminUser(admin), State(state))
        .await
        .unwrap();

    assert_eq!(analytics.total_users, 2);
    assert_eq!(analytics.verified_users, 1);
    assert_eq!(analytics.total_subjects, 1);
    assert_eq!(analytics.total_materials, 1);
    assert_eq!(analytics.total_downloads, 2);
}

#[tokio::test]
async fn delete_subject_reports_missing_subjects() {
    let (state, _) = mock_state();
    let admin = seed_user(&state, "admin@example.com", Role::Admin, true).await;

    let err = handlers::delete_subject(AdminUser(admin), State(state), AppPath(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(ref m) if m == "Subject not found"));
}

#[tokio::test]
async fn download_counts_every_issued_link() {
    let (state, _) = mock_state();
    let admin = seed_user(&state, "admin@example.com", Role::Admin, true).await;
    let member = seed_user(&state, "ann@example.com", Role::User, true).await;
    let subject = seed_subject(&state, "Chemistry", &admin).await;
    let material = state
        .repo
        .create_material(NewMaterial {
            title: "Bonds".to_string(),
            description: None,
            subject_id: subject.id,
            file_url: "http://localhost:9000/mock-bucket/1-bonds.pdf".to_string(),
            file_name: "bonds.pdf".to_string(),
            file_size: 7,
            uploaded_by: admin.id,
        })
        .await
        .unwrap();

    for _ in 0..2 {
        let Json(link) = handlers::download_material(
            VerifiedUser(member.clone()),
            State(state.clone()),
            AppPath(material.id),
        )
        .await
        .unwrap();
        assert_eq!(link.download_url, material.file_url);
    }

    let stored = state.repo.get_material(material.id).await.unwrap().unwrap();
    assert_eq!(stored.downloads, 2);

    let err = handlers::download_material(VerifiedUser(member), State(state), AppPath(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(ref m) if m == "Material not found"));
}
