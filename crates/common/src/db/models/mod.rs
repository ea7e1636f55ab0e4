//! SeaORM entity models
//!
//! Database entities for DentForge

mod dental_chart;
mod dental_procedure;
mod organization;
mod patient;
mod procedure_audit;
mod procedure_code;
mod schedule;
mod schedule_override;

pub use organization::{
    Entity as OrganizationEntity,
    Model as Organization,
    ActiveModel as OrganizationActiveModel,
    Column as OrganizationColumn,
};

pub use patient::{
    Entity as PatientEntity,
    Model as Patient,
    ActiveModel as PatientActiveModel,
    Column as PatientColumn,
};

pub use procedure_code::{
    Entity as ProcedureCodeEntity,
    Model as ProcedureCodeRow,
    ActiveModel as ProcedureCodeActiveModel,
    Column as ProcedureCodeColumn,
};

pub use dental_procedure::{
    Entity as DentalProcedureEntity,
    Model as DentalProcedure,
    ActiveModel as DentalProcedureActiveModel,
    Column as DentalProcedureColumn,
};

pub use procedure_audit::{
    Entity as ProcedureAuditEntity,
    Model as ProcedureAudit,
    ActiveModel as ProcedureAuditActiveModel,
    Column as ProcedureAuditColumn,
};

pub use dental_chart::{
    Entity as DentalChartEntity,
    Model as DentalChart,
    ActiveModel as DentalChartActiveModel,
    Column as DentalChartColumn,
};

pub use schedule::{
    Entity as ScheduleEntity,
    Model as Schedule,
    ActiveModel as ScheduleActiveModel,
    Column as ScheduleColumn,
};

pub use schedule_override::{
    Entity as ScheduleOverrideEntity,
    Model as ScheduleOverride,
    ActiveModel as ScheduleOverrideActiveModel,
    Column as ScheduleOverrideColumn,
};
