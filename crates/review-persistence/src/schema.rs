//! Esquema Diesel escrito a mano; debe coincidir con `migrations/`.

diesel::table! {
    workflows (id) {
        id -> Uuid,
        workspace_id -> Uuid,
        name -> Text,
        description -> Nullable<Text>,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    stages (id) {
        id -> Uuid,
        workflow_id -> Uuid,
        name -> Text,
        description -> Nullable<Text>,
        color -> Nullable<Text>,
        order_index -> Int4,
        custom_statuses -> Jsonb,
        status_actions -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    stage_groups (id) {
        id -> Uuid,
        stage_id -> Uuid,
        workflow_id -> Uuid,
        name -> Text,
        description -> Nullable<Text>,
        color -> Text,
        icon -> Text,
        order_index -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    application_groups (id) {
        id -> Uuid,
        workflow_id -> Uuid,
        name -> Text,
        description -> Nullable<Text>,
        color -> Text,
        icon -> Text,
        order_index -> Int4,
        is_system -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    review_actions (id) {
        id -> Uuid,
        scope_kind -> Text,
        scope_id -> Uuid,
        name -> Text,
        description -> Nullable<Text>,
        color -> Text,
        icon -> Text,
        action_type -> Text,
        target_group_id -> Nullable<Uuid>,
        target_stage_id -> Nullable<Uuid>,
        status_value -> Nullable<Text>,
        requires_comment -> Bool,
        is_system -> Bool,
        order_index -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    applications (id) {
        id -> Uuid,
        form_id -> Uuid,
        workflow_id -> Nullable<Uuid>,
        applicant_id -> Nullable<Text>,
        data -> Jsonb,
        version -> Int8,
        submitted_at -> Nullable<Timestamptz>,
        last_autosave_at -> Nullable<Timestamptz>,
        stage_id -> Nullable<Uuid>,
        stage_group_id -> Nullable<Uuid>,
        group_id -> Nullable<Uuid>,
        status -> Text,
        current_status -> Nullable<Text>,
        tags -> Jsonb,
        scores -> Jsonb,
        decision -> Nullable<Text>,
        flagged -> Bool,
        extra -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    audit_log (seq) {
        seq -> Int8,
        application_id -> Uuid,
        history -> Text,
        reference -> Text,
        actor_id -> Nullable<Text>,
        comment -> Nullable<Text>,
        detail -> Jsonb,
        recorded_at -> Timestamptz,
    }
}

diesel::table! {
    submission_versions (id) {
        id -> Uuid,
        application_id -> Uuid,
        version -> Int8,
        data -> Jsonb,
        changed_fields -> Jsonb,
        change_type -> Text,
        checksum -> Text,
        created_by -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    outbox (id) {
        id -> Uuid,
        application_id -> Uuid,
        form_id -> Uuid,
        workflow_id -> Nullable<Uuid>,
        event_type -> Text,
        event -> Jsonb,
        idempotency_key -> Text,
        attempts -> Int4,
        last_error -> Nullable<Text>,
        state -> Text,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(stages -> workflows (workflow_id));
diesel::joinable!(stage_groups -> stages (stage_id));
diesel::joinable!(application_groups -> workflows (workflow_id));
diesel::joinable!(audit_log -> applications (application_id));
diesel::joinable!(submission_versions -> applications (application_id));
diesel::joinable!(outbox -> applications (application_id));

diesel::allow_tables_to_appear_in_same_query!(
    workflows,
    stages,
    stage_groups,
    application_groups,
    review_actions,
    applications,
    audit_log,
    submission_versions,
    outbox,
);
