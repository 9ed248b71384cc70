use crate::infra::{Campus, DEFAULT_ACADEMIC_YEAR};
use clap::Args;
use dormitory_allocation::error::AppError;
use dormitory_allocation::housing::{
    Actor, AllocationSettings, AssignmentMode, AssignmentOutcome, BatchReport,
    DormitoryStore, InventoryImporter, PaymentConfirmation, QueueFilter, RegistrationRequest,
    RoomPreferences, RosterImporter, StudentId,
};
use std::path::PathBuf;

const SAMPLE_INVENTORY: &str = "\
dormitory_id,dormitory_name,floor,room,room_type,gender_policy,max_capacity,price_per_month,status,amenities
DORM-A,Block A,1,101,4-person-service,male,,900,available,wifi;fridge;private bathroom
DORM-A,Block A,2,201,8-person,male,,600,available,wifi
DORM-B,Block B,1,105,5-person,female,,700,available,wifi;air conditioning
DORM-B,Block B,2,205,4-person-service,female,,950,available,wifi;fridge
DORM-C,Block C,3,301,10-person,any,,500,available,
";

const SAMPLE_ROSTER: &str = "\
student_id,name,email,phone,gender,academic_year,faculty
S1,An Nguyen,an@uni.example,0901000001,male,1,Engineering
S2,Binh Tran,binh@uni.example,0901000002,male,2,Economics
S3,Chi Le,chi@uni.example,0901000003,female,1,Law
S4,Dung Vo,dung@uni.example,0901000004,female,4,Medicine
S5,Em Do,em@uni.example,0901000005,male,1,Engineering
";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Room inventory CSV. Defaults to a small built-in campus.
    #[arg(long)]
    pub(crate) inventory: Option<PathBuf>,
    /// Student roster CSV. Defaults to a built-in roster.
    #[arg(long)]
    pub(crate) roster: Option<PathBuf>,
    /// Academic year the demo registers against.
    #[arg(long, default_value = DEFAULT_ACADEMIC_YEAR)]
    pub(crate) academic_year: String,
    /// Continuing student walked through the full registration flow.
    #[arg(long, default_value = "S2")]
    pub(crate) student: String,
    /// Skip the first-year batch portion of the demo.
    #[arg(long)]
    pub(crate) skip_batch: bool,
}

#[derive(Args, Debug)]
pub(crate) struct AutoAssignArgs {
    /// Room inventory CSV export
    #[arg(long)]
    pub(crate) inventory: PathBuf,
    /// Student roster CSV export
    #[arg(long)]
    pub(crate) roster: PathBuf,
    /// Academic year to assign for
    #[arg(long, default_value = DEFAULT_ACADEMIC_YEAR)]
    pub(crate) academic_year: String,
    /// Admin recorded as the actor on every placement
    #[arg(long, default_value = "housing-office")]
    pub(crate) admin_id: String,
}

pub(crate) fn run_auto_assign(args: AutoAssignArgs) -> Result<(), AppError> {
    let AutoAssignArgs {
        inventory,
        roster,
        academic_year,
        admin_id,
    } = args;

    let campus = Campus::new(AllocationSettings::default(), &academic_year)?;
    campus.load_files(Some(&inventory), Some(&roster))?;

    let report = campus
        .service
        .auto_assign_first_years(&academic_year, &Actor::admin(admin_id))?;
    render_batch_report(&report);
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        inventory,
        roster,
        academic_year,
        student,
        skip_batch,
    } = args;

    let campus = Campus::new(AllocationSettings::default(), &academic_year)?;
    match inventory {
        Some(path) => campus.load_dormitories(InventoryImporter::from_path(path)?)?,
        None => campus.load_dormitories(InventoryImporter::from_reader(SAMPLE_INVENTORY.as_bytes())?)?,
    };
    match roster {
        Some(path) => campus.load_students(RosterImporter::from_path(path)?)?,
        None => campus.load_students(RosterImporter::from_reader(SAMPLE_ROSTER.as_bytes())?)?,
    };

    println!("Dormitory allocation demo ({academic_year})");
    render_inventory(&campus)?;

    let admin = Actor::admin("housing-office");
    walk_registration(&campus, &academic_year, StudentId(student), &admin);

    if !skip_batch {
        println!("\nFirst-year batch assignment");
        match campus.service.auto_assign_first_years(&academic_year, &admin) {
            Ok(report) => render_batch_report(&report),
            Err(err) => println!("  Batch unavailable: {err}"),
        }
    }

    println!("\nPriority queue");
    match campus
        .service
        .priority_queue(&academic_year, &QueueFilter::default())
    {
        Ok(entries) if entries.is_empty() => println!("  (no unresolved applications)"),
        Ok(entries) => {
            for entry in entries {
                println!(
                    "  - {} {} | {} | score {} | {}",
                    entry.student_id,
                    entry.student_name,
                    entry.year_group,
                    entry.priority_score,
                    entry.status
                );
            }
        }
        Err(err) => println!("  Queue unavailable: {err}"),
    }

    match campus.service.check_consistency() {
        Ok(report) if report.is_consistent() => println!(
            "\nConsistency: {} students and {} dormitories agree",
            report.students_checked, report.dormitories_checked
        ),
        Ok(report) => {
            println!("\nConsistency: {} discrepancies", report.discrepancies.len());
            for discrepancy in &report.discrepancies {
                println!("  - {discrepancy:?}");
            }
        }
        Err(err) => println!("\nConsistency check unavailable: {err}"),
    }

    let events = campus.notifier.events();
    println!("\nNotifications dispatched: {}", events.len());
    for event in events {
        println!("  - {} -> {}", event.kind.label(), event.student_id);
    }
    println!("Activity entries recorded: {}", campus.activity.entries().len());

    Ok(())
}

fn render_inventory(campus: &Campus) -> Result<(), AppError> {
    let dormitories = campus
        .dormitories
        .list()
        .map_err(|err| AppError::Housing(err.into()))?;
    println!("Inventory");
    for versioned in dormitories {
        let dormitory = versioned.document;
        let rooms = dormitory.rooms().count();
        println!(
            "  - {} {} | {} floors | {} rooms",
            dormitory.id,
            dormitory.name,
            dormitory.total_floors(),
            rooms
        );
    }
    Ok(())
}

fn walk_registration(campus: &Campus, academic_year: &str, student_id: StudentId, admin: &Actor) {
    let service = &campus.service;
    println!("\nRegistration walkthrough for {student_id}");

    let decision = match service.evaluate_eligibility(&student_id, academic_year) {
        Ok(decision) => decision,
        Err(err) => {
            println!("  Eligibility unavailable: {err}");
            return;
        }
    };
    println!(
        "- Eligibility: {} ({}) | year group {} | can choose room: {}",
        if decision.eligible { "eligible" } else { "blocked" },
        decision.reason,
        decision.year_group,
        decision.can_choose_room
    );
    if !decision.eligible {
        return;
    }

    match service.search_rooms(&student_id, academic_year, None) {
        Ok(candidates) => {
            println!("- Top open rooms:");
            for candidate in candidates.iter().take(3) {
                println!(
                    "    {} | {} of {} free | {} per month",
                    candidate.locator(),
                    candidate.remaining,
                    candidate.max_capacity,
                    candidate.price_per_month
                );
            }
        }
        Err(err) => println!("  Room search unavailable: {err}"),
    }

    let application = match service.submit(RegistrationRequest {
        student_id: student_id.clone(),
        academic_year: academic_year.to_string(),
        preferences: RoomPreferences::default(),
        requested_room: None,
    }) {
        Ok(application) => application,
        Err(err) => {
            println!("  Submission rejected: {err}");
            return;
        }
    };
    println!("- Submitted {} -> {}", application.id, application.status);

    let steps = service
        .approve(&application.id, admin)
        .and_then(|approved| {
            println!("- Approved -> {}", approved.status);
            service.confirm_payment(
                &application.id,
                admin,
                PaymentConfirmation {
                    amount: 2_700_000,
                    method: Some("bank transfer".to_string()),
                    ..PaymentConfirmation::default()
                },
            )
        })
        .and_then(|paid| {
            println!("- Payment confirmed -> {}", paid.status);
            service.assign(&application.id, admin, AssignmentMode::Automatic)
        });

    match steps {
        Ok(AssignmentOutcome::Assigned { assignment }) => {
            println!("- Assigned to {assignment}");
            match service.check_in(&application.id, admin) {
                Ok(checked_in) => println!("- Checked in -> {}", checked_in.status),
                Err(err) => println!("  Check-in refused: {err}"),
            }
        }
        Ok(AssignmentOutcome::Waitlisted { reason }) => println!("- Waitlisted: {reason}"),
        Err(err) => println!("  Registration stopped: {err}"),
    }

    match service.get(&application.id) {
        Ok(stored) => match serde_json::to_string_pretty(&stored.status_view()) {
            Ok(json) => println!("  Public status payload:\n{json}"),
            Err(err) => println!("  Public status payload unavailable: {err}"),
        },
        Err(err) => println!("  Application lookup failed: {err}"),
    }
}

fn render_batch_report(report: &BatchReport) {
    println!(
        "First-year assignment for {}: {} placed, {} skipped",
        report.academic_year,
        report.assigned.len(),
        report.skipped.len()
    );
    for placement in &report.assigned {
        println!(
            "  + {} ({}) -> {}",
            placement.student_id, placement.application_id, placement.assignment
        );
    }
    for skip in &report.skipped {
        println!("  - {} skipped: {}", skip.student_id, skip.reason);
    }
}
