mod common;

use anyhow::Result;

use lattice_core::error::CoreError;
use lattice_core::model::activity::ActivityAction;
use lattice_core::model::fields::{FieldType, FieldValue};
use lattice_core::model::permission::PermissionLevel;
use lattice_core::model::resource::{AssignmentRole, ResourceKind, ResourceStatus, StatusOp};

// Create/delete cascades: linkage, counters, activity, and what is left alone.

#[tokio::test]
async fn create_links_container_and_bumps_statistics() -> Result<()> {
    let t = common::test_core();
    let owner = common::member(t.org);

    let project = t.core.create_with_access(common::project_input("Apollo"), &owner).await?;
    let phase = t.core.create_with_access(common::phase_input("Design", project.id), &owner).await?;
    let sprint = t.core.create_with_access(common::sprint_input("Sprint 1", project.id), &owner).await?;

    let project = t.core.get_resource(ResourceKind::Project, project.id, &owner).await?;
    assert_eq!(project.phase_ids, vec![phase.id]);
    assert_eq!(project.sprint_ids, vec![sprint.id]);
    assert_eq!(project.statistics.total_phases, 1);
    assert_eq!(project.statistics.total_sprints, 1);

    // the creator's entry on the phase inherits from the project grant
    use lattice_core::model::permission::AccessType;
    use lattice_core::store::AccessStore;
    let entry = t
        .store
        .find_entry(t.org, owner.user_id, ResourceKind::Phase, phase.id)
        .await?
        .expect("creator entry missing");
    assert_eq!(entry.level, PermissionLevel::Admin);
    assert_eq!(entry.access_type, AccessType::Inherited);
    assert_eq!(entry.inherited_from.unwrap().kind, ResourceKind::Project);
    Ok(())
}

#[tokio::test]
async fn delete_unlinks_but_leaves_children_and_entries_alone() -> Result<()> {
    let t = common::test_core();
    let owner = common::member(t.org);

    // U creates P, then PH under P, then a folder inside PH
    let project = t.core.create_with_access(common::project_input("Apollo"), &owner).await?;
    let phase = t.core.create_with_access(common::phase_input("Design", project.id), &owner).await?;
    let folder = t
        .core
        .create_with_access(
            lattice_core::model::resource::NewResource {
                project_id: Some(project.id),
                phase_id: Some(phase.id),
                ..lattice_core::model::resource::NewResource::named(ResourceKind::Folder, "Specs")
            },
            &owner,
        )
        .await?;

    let entries_before = t.store.entry_count().await;

    let deleted = t.core.delete_with_cascade(ResourceKind::Phase, phase.id, &owner).await?;
    assert!(deleted.is_deleted);
    assert!(!deleted.is_active);
    assert_eq!(deleted.deleted_by, Some(owner.user_id));

    // the project dropped the phase from its list and decremented by one
    let project = t.core.get_resource(ResourceKind::Project, project.id, &owner).await?;
    assert!(project.phase_ids.is_empty());
    assert_eq!(project.statistics.total_phases, 0);

    // the folder under the phase stays live and reachable
    let folder = t.core.get_resource(ResourceKind::Folder, folder.id, &owner).await?;
    assert!(!folder.is_deleted);

    // no access entry was touched
    assert_eq!(t.store.entry_count().await, entries_before);

    // the deleted phase itself reads as gone
    let err = t.core.get_resource(ResourceKind::Phase, phase.id, &owner).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn restore_revives_without_relinking() -> Result<()> {
    let t = common::test_core();
    let owner = common::member(t.org);

    let project = t.core.create_with_access(common::project_input("Apollo"), &owner).await?;
    let phase = t.core.create_with_access(common::phase_input("Design", project.id), &owner).await?;

    t.core.delete_with_cascade(ResourceKind::Phase, phase.id, &owner).await?;
    let restored = t.core.restore(ResourceKind::Phase, phase.id, &owner).await?;
    assert!(!restored.is_deleted);
    assert!(restored.is_active);
    assert!(restored.deleted_at.is_none());

    // restore does not re-link into the project
    let project = t.core.get_resource(ResourceKind::Project, project.id, &owner).await?;
    assert!(project.phase_ids.is_empty());
    assert_eq!(project.statistics.total_phases, 0);

    // restoring a live resource is a validation error
    let err = t.core.restore(ResourceKind::Phase, phase.id, &owner).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn create_validations_reject_before_any_write() -> Result<()> {
    let t = common::test_core();
    let owner = common::member(t.org);

    let err = t.core.create_with_access(common::project_input("   "), &owner).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    // folder with no container reference at all
    let input = lattice_core::model::resource::NewResource::named(ResourceKind::Folder, "Loose");
    let err = t.core.create_with_access(input, &owner).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    // phase without a project
    let input = lattice_core::model::resource::NewResource::named(ResourceKind::Phase, "Orphan");
    let err = t.core.create_with_access(input, &owner).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    // parent must exist
    let input = common::phase_input("Nested", uuid::Uuid::new_v4());
    let err = t.core.create_with_access(input, &owner).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));

    // nothing got persisted along the way
    assert_eq!(t.store.entry_count().await, 0);
    assert!(t.store.activity_log().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn sprint_status_machine_via_the_controller() -> Result<()> {
    let t = common::test_core();
    let owner = common::member(t.org);

    let project = t.core.create_with_access(common::project_input("Apollo"), &owner).await?;
    let sprint = t.core.create_with_access(common::sprint_input("Sprint 1", project.id), &owner).await?;

    // pausing a planning sprint has no effect and logs nothing
    let log_before = t.store.activity_log().await.len();
    let unchanged = t
        .core
        .transition_status(ResourceKind::Sprint, sprint.id, StatusOp::Pause, &owner)
        .await?;
    assert_eq!(unchanged.status, ResourceStatus::Planning);
    assert_eq!(t.store.activity_log().await.len(), log_before);

    // start moves to active and stamps the actual start date
    let started = t
        .core
        .transition_status(ResourceKind::Sprint, sprint.id, StatusOp::Start, &owner)
        .await?;
    assert_eq!(started.status, ResourceStatus::Active);
    assert!(started.actual_start_date.is_some());

    // starting again is a no-op
    let again = t
        .core
        .transition_status(ResourceKind::Sprint, sprint.id, StatusOp::Start, &owner)
        .await?;
    assert_eq!(again.status, ResourceStatus::Active);

    // completion pins progress and stamps the end date
    let done = t
        .core
        .transition_status(ResourceKind::Sprint, sprint.id, StatusOp::Complete, &owner)
        .await?;
    assert_eq!(done.status, ResourceStatus::Completed);
    assert_eq!(done.progress, 100);
    assert!(done.actual_end_date.is_some());
    Ok(())
}

#[tokio::test]
async fn issue_counters_and_completion_rate() -> Result<()> {
    let t = common::test_core();
    let owner = common::member(t.org);

    let project = t.core.create_with_access(common::project_input("Apollo"), &owner).await?;
    let sprint = t.core.create_with_access(common::sprint_input("Sprint 1", project.id), &owner).await?;

    for _ in 0..10 {
        t.core.record_issue(ResourceKind::Sprint, sprint.id, &owner).await?;
    }
    for _ in 0..3 {
        t.core.complete_issue(ResourceKind::Sprint, sprint.id, &owner).await?;
    }

    let sprint = t.core.get_resource(ResourceKind::Sprint, sprint.id, &owner).await?;
    assert_eq!(sprint.statistics.total_issues, 10);
    assert_eq!(sprint.statistics.completed_issues, 3);
    assert_eq!(sprint.statistics.open_issues(), 7);
    assert_eq!(sprint.statistics.completion_rate(), 30);

    // a fresh resource derives zero, not a division error
    let empty = t.core.create_with_access(common::sprint_input("Sprint 2", project.id), &owner).await?;
    assert_eq!(empty.statistics.completion_rate(), 0);

    let reopened = t.core.reopen_issue(ResourceKind::Sprint, sprint.id, &owner).await?;
    assert_eq!(reopened.statistics.completed_issues, 2);

    let removed = t.core.remove_issue(ResourceKind::Sprint, sprint.id, false, &owner).await?;
    assert_eq!(removed.statistics.total_issues, 9);
    Ok(())
}

#[tokio::test]
async fn owner_cannot_be_removed_from_members() -> Result<()> {
    let t = common::test_core();
    let owner = common::member(t.org);
    let mate = common::member(t.org);

    let project = t.core.create_with_access(common::project_input("Apollo"), &owner).await?;

    let err = t
        .core
        .remove_member(ResourceKind::Project, project.id, owner.user_id, &owner)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    // regular members come and go
    let with_mate = t
        .core
        .add_member(ResourceKind::Project, project.id, mate.user_id, AssignmentRole::Member, &owner)
        .await?;
    assert!(with_mate.is_assignee(mate.user_id));

    // adding twice leaves a single assignment
    let again = t
        .core
        .add_member(ResourceKind::Project, project.id, mate.user_id, AssignmentRole::Member, &owner)
        .await?;
    assert_eq!(again.assignments.iter().filter(|a| a.user_id == mate.user_id).count(), 1);

    let without = t
        .core
        .remove_member(ResourceKind::Project, project.id, mate.user_id, &owner)
        .await?;
    assert!(!without.is_assignee(mate.user_id));
    Ok(())
}

#[tokio::test]
async fn custom_fields_validate_against_declared_type() -> Result<()> {
    let t = common::test_core();
    let owner = common::member(t.org);

    let project = t.core.create_with_access(common::project_input("Apollo"), &owner).await?;

    let err = t
        .core
        .set_custom_field(
            ResourceKind::Project,
            project.id,
            "story_points",
            FieldType::Number,
            FieldValue::Text("a lot".into()),
            &owner,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let updated = t
        .core
        .set_custom_field(
            ResourceKind::Project,
            project.id,
            "story_points",
            FieldType::Number,
            FieldValue::Number(13.0),
            &owner,
        )
        .await?;
    assert_eq!(updated.custom_fields.len(), 1);

    // upsert by name replaces the value
    let updated = t
        .core
        .set_custom_field(
            ResourceKind::Project,
            project.id,
            "story_points",
            FieldType::Number,
            FieldValue::Number(21.0),
            &owner,
        )
        .await?;
    assert_eq!(updated.custom_fields.len(), 1);
    assert_eq!(updated.custom_fields[0].value, FieldValue::Number(21.0));
    Ok(())
}

#[tokio::test]
async fn comments_require_a_body_and_stick() -> Result<()> {
    let t = common::test_core();
    let owner = common::member(t.org);

    let project = t.core.create_with_access(common::project_input("Apollo"), &owner).await?;

    let err = t
        .core
        .add_comment(ResourceKind::Project, project.id, "   ", &owner)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let commented = t
        .core
        .add_comment(ResourceKind::Project, project.id, "kickoff is friday", &owner)
        .await?;
    assert_eq!(commented.comments.len(), 1);
    assert_eq!(commented.comments[0].author_id, owner.user_id);
    Ok(())
}

#[tokio::test]
async fn every_cascade_appends_one_activity_entry() -> Result<()> {
    let t = common::test_core();
    let owner = common::member(t.org);

    let project = t.core.create_with_access(common::project_input("Apollo"), &owner).await?;
    let phase = t.core.create_with_access(common::phase_input("Design", project.id), &owner).await?;
    t.core.delete_with_cascade(ResourceKind::Phase, phase.id, &owner).await?;

    let log = t.store.activity_log().await;
    let actions: Vec<_> = log.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            ActivityAction::ResourceCreated,
            ActivityAction::ResourceCreated,
            ActivityAction::ResourceDeleted,
        ]
    );

    // the delete entry carries the before/after snapshot of the flip
    let delete_entry = log.last().unwrap();
    assert_eq!(delete_entry.organization_id, t.org);
    assert_eq!(delete_entry.user_id, owner.user_id);
    assert_eq!(delete_entry.resource_id, phase.id);
    let changes = delete_entry.changes.as_ref().expect("delete should carry changes");
    assert!(changes.touched("is_deleted"));
    Ok(())
}

#[tokio::test]
async fn grants_below_admin_cannot_manage_access() -> Result<()> {
    let t = common::test_core();
    let owner = common::member(t.org);
    let editor = common::member(t.org);
    let outsider = common::member(t.org);

    let project = t.core.create_with_access(common::project_input("Apollo"), &owner).await?;
    t.core
        .grant_access(ResourceKind::Project, project.id, editor.user_id, PermissionLevel::Edit, &owner)
        .await?;

    let err = t
        .core
        .grant_access(ResourceKind::Project, project.id, outsider.user_id, PermissionLevel::View, &editor)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AccessDenied(_)));
    Ok(())
}
