//! Candidate generation.
//!
//! Candidates are produced username-major: every password for one username
//! is tried before moving to the next username, which keeps lockouts
//! isolated to a single account and lets the coordinator skip ahead.

use credsweep_core::{Candidate, CredentialSource};
use std::iter::FusedIterator;

#[derive(Debug, Clone, PartialEq, Eq)]
enum PasswordPlan {
    /// Cross every username with each password.
    Each(Vec<String>),
    /// One candidate per username with the absent-password sentinel.
    Absent,
}

/// Finite, restartable source of candidates.
///
/// Values are trimmed on construction; values that are blank after trimming
/// are dropped. Iterating borrows the generator, so one generator can be
/// shared by reference and iterated any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateGenerator {
    usernames: Vec<String>,
    passwords: PasswordPlan,
}

impl CandidateGenerator {
    /// Cross product of `usernames` and `passwords`.
    #[must_use]
    pub fn new(usernames: &CredentialSource, passwords: &CredentialSource) -> Self {
        Self::from_lists(usernames.values(), passwords.values())
    }

    /// Cross product of two ordered lists.
    pub fn from_lists<U, P>(usernames: U, passwords: P) -> Self
    where
        U: IntoIterator,
        U::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        Self {
            usernames: normalize(usernames),
            passwords: PasswordPlan::Each(normalize(passwords)),
        }
    }

    /// One password-less candidate per username, for confirming that
    /// usernames exist without testing a password.
    #[must_use]
    pub fn existence_checks(usernames: &CredentialSource) -> Self {
        Self {
            usernames: normalize(usernames.values()),
            passwords: PasswordPlan::Absent,
        }
    }

    /// Number of candidates the generator yields.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.passwords {
            PasswordPlan::Each(passwords) => self.usernames.len() * passwords.len(),
            PasswordPlan::Absent => self.usernames.len(),
        }
    }

    /// Whether the generator yields nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate candidates in username-major order.
    #[must_use]
    pub fn iter(&self) -> Candidates<'_> {
        Candidates {
            generator: self,
            user: 0,
            password: 0,
        }
    }
}

impl<'a> IntoIterator for &'a CandidateGenerator {
    type Item = Candidate;
    type IntoIter = Candidates<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`CandidateGenerator`].
#[derive(Debug, Clone)]
pub struct Candidates<'a> {
    generator: &'a CandidateGenerator,
    user: usize,
    password: usize,
}

impl Iterator for Candidates<'_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        let username = self.generator.usernames.get(self.user)?;

        match &self.generator.passwords {
            PasswordPlan::Absent => {
                self.user += 1;
                Some(Candidate::username_only(username.clone()))
            }
            PasswordPlan::Each(passwords) => {
                let Some(password) = passwords.get(self.password) else {
                    return None;
                };
                let candidate = Candidate::new(username.clone(), password.clone());

                self.password += 1;
                if self.password == passwords.len() {
                    self.password = 0;
                    self.user += 1;
                }
                Some(candidate)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match &self.generator.passwords {
            PasswordPlan::Each(passwords) => {
                let done = self.user * passwords.len() + self.password;
                self.generator.len().saturating_sub(done)
            }
            PasswordPlan::Absent => self.generator.usernames.len().saturating_sub(self.user),
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Candidates<'_> {}

impl FusedIterator for Candidates<'_> {}

fn normalize<I>(values: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    values
        .into_iter()
        .map(|value| value.as_ref().trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}
