//! Drive service integration tests.

mod helpers;

use uuid::Uuid;

use labtrack_core::ErrorKind;
use labtrack_entity::{
    CreateStorageDrive, DocumentApiDriveDetails, DriveDetails, DriveType, ExistingFolderPolicy,
    FolderOptions, LocalDriveDetails, ObjectStorageDriveDetails,
};
use labtrack_service::UpdateDriveRequest;

use helpers::TestApp;

#[tokio::test]
async fn test_register_and_list() {
    let app = TestApp::new();
    app.local_drive("Beta").await;
    let alpha = app.local_drive("Alpha").await;
    assert_eq!(alpha.drive_type, DriveType::Local);
    assert!(alpha.is_active());

    let names: Vec<String> = app
        .drives
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.display_name)
        .collect();
    assert_eq!(names, vec!["Alpha", "Beta"]);

    let found = app.drives.find_by_name("Alpha").await.unwrap().unwrap();
    assert_eq!(found.id, alpha.id);
    assert!(app.drives.find_by_name("Gamma").await.unwrap().is_none());

    let root = app.local_root("Alpha");
    let err = app
        .drives
        .register(CreateStorageDrive::new(
            "Alpha",
            root.clone(),
            DriveDetails::Local(LocalDriveDetails {
                root_path: root,
                existing_folder_policy: ExistingFolderPolicy::UseExisting,
            }),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Duplicate);

    let err = app.drives.get(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_unconfigured_backend_is_rejected() {
    let app = TestApp::new();
    let err = app
        .drives
        .register(CreateStorageDrive::new(
            "Documents",
            "/Shared/Lab",
            DriveDetails::DocumentApi(DocumentApiDriveDetails {
                base_url: "https://docs.example.com".into(),
                tenant: "lab".into(),
                api_token: "token".into(),
                root_folder_id: None,
            }),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
    assert!(app.drives.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_keeps_kind() {
    let app = TestApp::new();
    let drive = app.local_drive("Lab").await;

    let err = app
        .drives
        .update(
            drive.id,
            UpdateDriveRequest {
                display_name: None,
                root_path: None,
                details: Some(DriveDetails::ObjectStorage(ObjectStorageDriveDetails {
                    bucket: "lab".into(),
                    region: "us-east-1".into(),
                    endpoint: None,
                    access_key_id: None,
                    secret_access_key: None,
                    force_path_style: false,
                })),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    let err = app
        .drives
        .update(
            drive.id,
            UpdateDriveRequest {
                display_name: Some("  ".into()),
                root_path: None,
                details: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    let updated = app
        .drives
        .update(
            drive.id,
            UpdateDriveRequest {
                display_name: Some("Lab (primary)".into()),
                root_path: None,
                details: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.display_name, "Lab (primary)");
    assert_eq!(updated.root_path, drive.root_path);
    assert_eq!(updated.details, drive.details);
    assert!(updated.updated_at > drive.updated_at);
}

#[tokio::test]
async fn test_update_root_moves_local_root() {
    let app = TestApp::new();
    let drive = app.local_drive("Lab").await;
    let new_root = app.local_root("NewRoot");

    let updated = app
        .drives
        .update(
            drive.id,
            UpdateDriveRequest {
                display_name: None,
                root_path: Some(new_root.clone()),
                details: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.root_path, new_root);
    assert_eq!(updated.local_details().unwrap().root_path, new_root);

    let root = app
        .bindings
        .register_root_folder(drive.id, "", "Lab", FolderOptions::browser_root())
        .await
        .unwrap();
    assert!(root.path.ends_with("/NewRoot/"), "{}", root.path);

    let err = app
        .drives
        .update(
            drive.id,
            UpdateDriveRequest {
                display_name: None,
                root_path: Some(app.local_root("Other")),
                details: Some(DriveDetails::Local(LocalDriveDetails {
                    root_path: new_root,
                    existing_folder_policy: ExistingFolderPolicy::Fail,
                })),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_health_reports_unreachable_bucket() {
    let app = TestApp::new();
    let lab = app.local_drive("Lab").await;
    let bucket = app.object_drive("Bucket", "lab-data").await;
    let retired = app.local_drive("Retired").await;
    app.drives.deactivate(retired.id).await.unwrap();

    assert!(app.drives.health(lab.id).await.unwrap().healthy);
    assert!(app.drives.health(bucket.id).await.unwrap().healthy);

    app.object_store.bucket("lab-data").set_unreachable(true);
    let report = app.drives.health_all().await.unwrap();
    assert_eq!(report.len(), 2);
    for entry in &report {
        if entry.drive_id == bucket.id {
            assert!(!entry.healthy);
            assert_eq!(entry.drive_type, DriveType::ObjectStorage);
        } else {
            assert_eq!(entry.drive_id, lab.id);
            assert!(entry.healthy);
        }
    }

    let err = app.drives.health(retired.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
}
