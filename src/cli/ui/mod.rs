mod inspect_view;
mod painter;
mod progress_view;
mod spinner;
mod table;

pub(crate) use self::inspect_view::InspectReportView;
pub(crate) use self::painter::Painter;
pub(crate) use self::progress_view::ProgressView;
pub(crate) use self::spinner::Spinner;
