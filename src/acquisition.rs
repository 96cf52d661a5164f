//! The license acquisition sequence as a typestate.
//!
//! `Idle -> CertificateFetched -> Challenged -> Licensed -> KeySet`. Each step
//! consumes the previous stage, so steps cannot be skipped, reordered or
//! repeated, and an error leaves nothing to resume: start a new attempt.
use std::fmt;

use crate::client::Client;
use crate::context::RequestContext;
use crate::error::Result;
use crate::key::KeySet;
use crate::message::{Challenge, LicenseResponse, ServerCertificate};
use crate::session::Session;

/// Network exchange within an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquisitionStep {
    /// Privacy mode certificate from the license server.
    Certificate,
    /// Challenge from the decryption API.
    Challenge,
    /// License from the license server.
    License,
    /// License submission to the decryption API.
    Submit,
}

impl fmt::Display for AcquisitionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AcquisitionStep::Certificate => "get server certificate",
            AcquisitionStep::Challenge => "get challenge",
            AcquisitionStep::License => "get license",
            AcquisitionStep::Submit => "decrypt license",
        })
    }
}

/// Observable state of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Idle,
    CertificateFetched,
    Challenged,
    LicenseObtained,
    KeysObtained,
    Failed,
}

/// Stage marker implemented by the typestate payloads.
pub trait Stage {
    const STATE: AcquisitionState;
}

/// Nothing has been sent yet.
#[derive(Debug)]
pub struct Idle;

#[derive(Debug)]
pub struct CertificateFetched {
    certificate: ServerCertificate,
}

#[derive(Debug)]
pub struct Challenged {
    session: Session,
}

#[derive(Debug)]
pub struct Licensed {
    session: Session,
    license: LicenseResponse,
}

impl Stage for Idle {
    const STATE: AcquisitionState = AcquisitionState::Idle;
}

impl Stage for CertificateFetched {
    const STATE: AcquisitionState = AcquisitionState::CertificateFetched;
}

impl Stage for Challenged {
    const STATE: AcquisitionState = AcquisitionState::Challenged;
}

impl Stage for Licensed {
    const STATE: AcquisitionState = AcquisitionState::LicenseObtained;
}

/// One license acquisition attempt.
#[derive(Debug)]
pub struct Acquisition<'a, S: Stage> {
    client: &'a Client,
    request: RequestContext,
    stage: S,
}

impl<'a, S: Stage> Acquisition<'a, S> {
    pub fn state(&self) -> AcquisitionState {
        S::STATE
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    fn advance<N: Stage>(
        self,
        step: AcquisitionStep,
        run: impl FnOnce(&'a Client, &RequestContext, S) -> Result<N>,
    ) -> Result<Acquisition<'a, N>> {
        let Acquisition {
            client,
            request,
            stage,
        } = self;

        debug!("Trying to {} for {}", step, request.license_url());
        match run(client, &request, stage) {
            Ok(stage) => {
                trace!("Acquisition {:?} -> {:?}", S::STATE, N::STATE);
                Ok(Acquisition {
                    client,
                    request,
                    stage,
                })
            }
            Err(e) => {
                warn!("Failed to {}: {}", step, e);
                trace!("Acquisition {:?} -> {:?}", S::STATE, AcquisitionState::Failed);
                Err(e)
            }
        }
    }
}

impl<'a> Acquisition<'a, Idle> {
    pub(crate) fn new(client: &'a Client, request: RequestContext) -> Self {
        Self {
            client,
            request,
            stage: Idle,
        }
    }

    /// Validate the request context and fetch the server certificate.
    pub fn fetch_certificate(self) -> Result<Acquisition<'a, CertificateFetched>> {
        self.request.validate()?;
        self.advance(AcquisitionStep::Certificate, |client, request, Idle| {
            let certificate = client.server_certificate(request)?;
            Ok(CertificateFetched { certificate })
        })
    }
}

impl<'a> Acquisition<'a, CertificateFetched> {
    pub fn certificate(&self) -> &ServerCertificate {
        &self.stage.certificate
    }

    /// Request a challenge for the fetched certificate and open a session on it.
    pub fn request_challenge(self) -> Result<Acquisition<'a, Challenged>> {
        self.advance(AcquisitionStep::Challenge, |client, request, stage| {
            let challenge = client.request_challenge(request, &stage.certificate)?;
            Ok(Challenged {
                session: client.session(request.clone(), challenge),
            })
        })
    }
}

impl<'a> Acquisition<'a, Challenged> {
    pub fn challenge(&self) -> &Challenge {
        self.stage.session.challenge()
    }

    /// Forward the challenge to the license server.
    pub fn fetch_license(self) -> Result<Acquisition<'a, Licensed>> {
        self.advance(AcquisitionStep::License, |client, request, stage| {
            let license = client.license(request, &stage.session.challenge().challenge)?;
            Ok(Licensed {
                session: stage.session,
                license,
            })
        })
    }
}

impl<'a> Acquisition<'a, Licensed> {
    pub fn license(&self) -> &LicenseResponse {
        &self.stage.license
    }

    /// Submit the license through the session; terminal.
    pub fn submit(self) -> Result<KeySet> {
        let Licensed { session, license } = self.stage;
        debug!("Trying to {} for {}", AcquisitionStep::Submit, self.request.license_url());
        match session.submit_license_response(&license) {
            Ok(keys) => {
                trace!(
                    "Acquisition {:?} -> {:?}",
                    AcquisitionState::LicenseObtained,
                    AcquisitionState::KeysObtained
                );
                Ok(keys)
            }
            Err(e) => {
                warn!("Failed to {}: {}", AcquisitionStep::Submit, e);
                trace!(
                    "Acquisition {:?} -> {:?}",
                    AcquisitionState::LicenseObtained,
                    AcquisitionState::Failed
                );
                Err(e)
            }
        }
    }
}
