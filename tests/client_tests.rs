mod common;

use common::{mock_state, spawn_app};
use study_buddy::{
    bootstrap::ensure_admin,
    client::{ApiClient, Area, ClientError, MaterialUpload, Navigation},
    config::AdminSeed,
    models::Role,
};

fn api_status(err: ClientError) -> u16 {
    match err {
        ClientError::Api { status, .. } => status,
        other => panic!("expected an API error, got {:?}", other),
    }
}

#[tokio::test]
async fn full_study_buddy_scenario() {
    let (state, storage) = mock_state();
    ensure_admin(
        state.repo.as_ref(),
        &AdminSeed {
            name: "Admin User".to_string(),
            email: "admin@example.com".to_string(),
            password: "admin-password".to_string(),
        },
    )
    .await
    .unwrap();
    let base_url = spawn_app(state).await;

    // A new member registers and logs in, but cannot read content yet.
    let mut member = ApiClient::new(&base_url);
    let registered = member
        .register("Ann", "ann@example.com", "secret123")
        .await
        .unwrap();
    assert!(!registered.user.is_verified);

    member.login("ann@example.com", "secret123").await.unwrap();
    assert_eq!(
        member.guard(Area::Member),
        Navigation::ToLogin("Your account is not verified yet")
    );
    assert_eq!(api_status(member.subjects().await.unwrap_err()), 403);
    // A 403 does not end the session.
    assert!(member.session().is_some());

    // The admin verifies the member and publishes a subject with one file.
    let mut admin = ApiClient::new(&base_url);
    let session = admin.login("admin@example.com", "admin-password").await.unwrap();
    assert_eq!(session.user.role, Role::Admin);
    assert_eq!(admin.guard(Area::Admin), Navigation::Proceed);

    let users = admin.users().await.unwrap();
    let ann = users.iter().find(|u| u.email == "ann@example.com").unwrap();
    admin.verify_user(ann.id).await.unwrap();

    let subject = admin
        .create_subject("Physics", Some("Mechanics and optics"))
        .await
        .unwrap();
    let material = admin
        .upload_material(
            subject.id,
            MaterialUpload {
                title: "Kinematics".to_string(),
                description: None,
                file_name: "kinematics.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                bytes: b"%PDF-1.4".to_vec(),
            },
        )
        .await
        .unwrap();
    assert_eq!(storage.uploaded_keys().len(), 1);

    // After a refresh the member sees the change and can download.
    let profile = member.refresh_profile().await.unwrap();
    assert!(profile.is_verified);
    assert_eq!(member.guard(Area::Member), Navigation::Proceed);
    assert_eq!(
        member.guard(Area::Admin),
        Navigation::ToDashboard("Admin access required")
    );

    let subjects = member.subjects().await.unwrap();
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0].creator_name.as_deref(), Some("Admin User"));

    let materials = member.materials(subject.id).await.unwrap();
    assert_eq!(materials[0].id, material.id);

    let first = member.download_url(material.id).await.unwrap();
    let second = member.download_url(material.id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first, material.file_url);

    // Members stay out of the admin API.
    assert_eq!(api_status(member.analytics().await.unwrap_err()), 403);

    let analytics = admin.analytics().await.unwrap();
    assert_eq!(analytics.total_users, 2);
    assert_eq!(analytics.verified_users, 2);
    assert_eq!(analytics.total_downloads, 2);

    // Deleting the subject takes its materials with it.
    admin.delete_subject(subject.id).await.unwrap();
    assert!(member.subjects().await.unwrap().is_empty());
    assert_eq!(admin.analytics().await.unwrap().total_materials, 0);

    // Admins are protected; members are not.
    let admin_id = admin.session().unwrap().user.id;
    assert_eq!(api_status(admin.delete_user(admin_id).await.unwrap_err()), 400);
    admin.delete_user(ann.id).await.unwrap();

    // The member's token now points at nothing.
    assert_eq!(api_status(member.subjects().await.unwrap_err()), 403);
}

#[tokio::test]
async fn a_rejected_token_clears_the_session() {
    let (mut state, _) = mock_state();
    // Every token this server issues is already expired.
    state.config.jwt_ttl_hours = -1;
    let base_url = spawn_app(state).await;

    let mut client = ApiClient::new(&base_url);
    client.register("Bo", "bo@example.com", "secret123").await.unwrap();
    client.login("bo@example.com", "secret123").await.unwrap();
    assert!(client.session().is_some());

    assert_eq!(api_status(client.refresh_profile().await.unwrap_err()), 401);
    assert!(client.session().is_none());
    assert_eq!(
        client.guard(Area::Member),
        Navigation::ToLogin("Please login to access this page")
    );
    assert!(matches!(client.subjects().await, Err(ClientError::NoSession)));
}

#[tokio::test]
async fn bad_credentials_surface_as_401() {
    let (state, _) = mock_state();
    let base_url = spawn_app(state).await;

    let mut client = ApiClient::new(&base_url);
    let err = client.login("nobody@example.com", "whatever").await.unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid credentials");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(client.session().is_none());
}
