// Intake: the HTTP half of the service.
// Uploads become a record plus a queued job; status polling reads the record back.

pub mod handlers;
