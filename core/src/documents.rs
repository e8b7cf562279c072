//! Bundled collaborators for the dispatcher.
//!
//! `DirectoryDocumentService` writes plain-text agreements to a local
//! directory; `AgreementMailComposer` builds the email a mail relay
//! would send. Deployments with a real document store or mailer plug in
//! their own `DocumentService` / `Notifier` instead.

use crate::{
    dispatch::{ArtifactRef, DocumentService, NotificationPreview, Notifier},
    loan::Loan,
    types::{LoanId, Money, UserId},
};
use anyhow::Context;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const DATE_DISPLAY: &str = "%d %b %Y";

pub struct DirectoryDocumentService {
    dir:        PathBuf,
    url_prefix: String,
}

impl DirectoryDocumentService {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir:        dir.as_ref().to_path_buf(),
            url_prefix: "/uploads".into(),
        }
    }

    /// Prefix of the returned artifact references (default "/uploads").
    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn path_of(&self, artifact: &ArtifactRef) -> Option<PathBuf> {
        artifact
            .0
            .strip_prefix(&self.url_prefix)
            .map(|name| self.dir.join(name.trim_start_matches('/')))
    }

    fn write(&self, file_name: &str, content: &str) -> anyhow::Result<ArtifactRef> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.dir.join(file_name);
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(ArtifactRef(format!("{}/{file_name}", self.url_prefix)))
    }
}

impl DocumentService for DirectoryDocumentService {
    fn generate_agreement(
        &self,
        loan_id: LoanId,
        investor_id: UserId,
        amount: Money,
    ) -> anyhow::Result<ArtifactRef> {
        let content = format!(
            "Loan Agreement\n\
             \n\
             Date: {date}\n\
             \n\
             This document serves as an agreement that investor #{investor_id} has invested \
             an amount of {amount:.2} into Loan #{loan_id}.\n\
             \n\
             The agreement becomes effective once the loan reaches its funding goal.\n",
            date = Utc::now().format(DATE_DISPLAY),
        );
        self.write(&format!("agreement_loan{loan_id}_investor{investor_id}.txt"), &content)
    }

    fn generate_borrower_agreement(&self, loan: &Loan) -> anyhow::Result<ArtifactRef> {
        let content = format!(
            "Loan Agreement - Borrower Copy\n\
             \n\
             Date: {date}\n\
             Loan ID: {loan_id}\n\
             \n\
             Borrower ID : {borrower}\n\
             \n\
             Loan Terms:\n\
             Amount       : {principal:.2}\n\
             Interest     : {rate:.2}%\n\
             Expected ROI : {roi:.2}%\n\
             \n\
             The borrower agrees to the above loan terms, including repayment of\n\
             principal and interest.\n\
             \n\
             Signed by Borrower: _________________________\n\
             \n\
             Date: _______________\n",
            date = Utc::now().format(DATE_DISPLAY),
            loan_id = loan.loan_id,
            borrower = loan.borrower_id,
            principal = loan.principal,
            rate = loan.rate,
            roi = loan.roi,
        );
        self.write(&format!("agreement_loan{}_borrower.txt", loan.loan_id), &content)
    }
}

/// Composes agreement emails. Addresses come from the identity provider
/// and are registered up front; unknown investors fail to compose.
pub struct AgreementMailComposer {
    base_url:  String,
    addresses: RwLock<HashMap<UserId, String>>,
}

impl AgreementMailComposer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url:  base_url.into().trim_end_matches('/').to_string(),
            addresses: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, user_id: UserId, email: impl Into<String>) {
        self.addresses.write().insert(user_id, email.into());
    }

    pub fn with_address(self, user_id: UserId, email: impl Into<String>) -> Self {
        self.register(user_id, email);
        self
    }
}

impl Notifier for AgreementMailComposer {
    fn compose(
        &self,
        recipient: UserId,
        loan_id: LoanId,
        artifact: &ArtifactRef,
    ) -> anyhow::Result<NotificationPreview> {
        let to = self
            .addresses
            .read()
            .get(&recipient)
            .cloned()
            .with_context(|| format!("no email address on file for investor {recipient}"))?;

        let subject = format!("Loan Agreement for Loan #{loan_id}");
        let body = format!(
            "Dear Investor,\n\
             \n\
             Thank you for investing in Loan #{loan_id}.\n\
             Please review the loan agreement at the link below:\n\
             \n\
             {base}{artifact}\n\
             \n\
             Sincerely,\n\
             Loan Service Team",
            base = self.base_url,
        );
        log::debug!("composed agreement email to {to} for loan {loan_id}");
        Ok(NotificationPreview { to, subject, body })
    }
}
