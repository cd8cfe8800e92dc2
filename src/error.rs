#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("cannot read or write image")]
    Image(#[from] crate::ImageError),
    #[error("cannot build `::aosim::Atmosphere`")]
    Atmosphere(#[from] crate::AtmosphereError),
    #[error("cannot build `::aosim::Telescope`")]
    Telescope(#[from] crate::TelescopeError),
    #[error("cannot build `::aosim::DeformableMirror`")]
    DeformableMirror(#[from] crate::DeformableMirrorError),
    #[error("cannot build `::aosim::ShackHartmann`")]
    ShackHartmann(#[from] crate::ShackHartmannError),
    #[error("cannot build `::aosim::Ccd`")]
    Ccd(#[from] crate::CcdError),
    #[error("cannot build `::aosim::Simulator`")]
    Simulator(#[from] crate::SimulatorBuilderError),
    #[error("wavefront corrector control failed")]
    Wfc(#[from] crate::WfcError),
    #[error("calibration failed")]
    Calibration(#[from] crate::CalibrationError),
    #[error("camera failure")]
    Camera(#[from] crate::CameraError),
}
